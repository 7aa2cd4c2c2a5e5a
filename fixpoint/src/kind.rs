use core::{any::Any, fmt};
use std::sync::Arc;

use compact_str::{CompactString, ToCompactString};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::{Entity, PropertyValue, StoreError};

/// A process-unique identifier naming a lattice of property values.
///
/// Kinds are dense integers assigned by a [PropertyKindRegistry]; all lattice
/// operations on stored values are dispatched through the registry using this
/// id.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PropertyKind(u32);

impl PropertyKind {
    #[inline(always)]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    #[inline(always)]
    pub(crate) const fn from_u32(id: u32) -> Self {
        Self(id)
    }
}

impl fmt::Display for PropertyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pk{}", self.0)
    }
}

/// Why a fallback value is being installed for a cell at phase completion.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum FallbackReason {
    /// No analysis executed in the phase derives the kind at all.
    NotComputedByAnyAnalysis,
    /// An analysis deriving the kind was scheduled in the phase, but never
    /// produced a value for this entity.
    NotYetDerivedByScheduledAnalysis,
}

pub type MeetFn = Arc<dyn Fn(&PropertyValue, &PropertyValue) -> PropertyValue + Send + Sync>;
pub type FallbackFn = Arc<dyn Fn(FallbackReason) -> PropertyValue + Send + Sync>;
pub type FastTrackFn = Arc<dyn Fn(&Entity) -> Option<PropertyValue> + Send + Sync>;
pub type SimplifyFn = Arc<dyn Fn(&PropertyValue, &PropertyValue) -> PropertyValue + Send + Sync>;

/// The registered description of one property kind: its lattice bounds, the
/// meet operator, and the per-kind policy hooks.
struct KindInfo {
    name: CompactString,
    bottom: PropertyValue,
    top: PropertyValue,
    meet: MeetFn,
    fallback: FallbackFn,
    fast_track: Option<FastTrackFn>,
    simplify: Option<SimplifyFn>,
}

/// Builder for registering a new property kind.
///
/// `meet` must be associative and commutative with identity `top`; the
/// fallback rule maps a [FallbackReason] to the property installed for cells
/// that remain unresolved at phase completion.
pub struct PropertyKindBuilder {
    name: CompactString,
    bottom: PropertyValue,
    top: PropertyValue,
    meet: MeetFn,
    fallback: FallbackFn,
    fast_track: Option<FastTrackFn>,
    simplify: Option<SimplifyFn>,
}

impl PropertyKindBuilder {
    pub fn new(
        name: impl AsRef<str>,
        bottom: PropertyValue,
        top: PropertyValue,
        meet: impl Fn(&PropertyValue, &PropertyValue) -> PropertyValue + Send + Sync + 'static,
        fallback: impl Fn(FallbackReason) -> PropertyValue + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.as_ref().to_compact_string(),
            bottom,
            top,
            meet: Arc::new(meet),
            fallback: Arc::new(fallback),
            fast_track: None,
            simplify: None,
        }
    }

    /// Attach a synchronous best-effort shortcut, consulted on queries of
    /// still-unknown cells before a lazy computation is scheduled.
    pub fn with_fast_track(
        mut self,
        fast_track: impl Fn(&Entity) -> Option<PropertyValue> + Send + Sync + 'static,
    ) -> Self {
        self.fast_track = Some(Arc::new(fast_track));
        self
    }

    /// Attach a rule that collapses an observed `[lb, ub]` interval to the
    /// property a cell should be fixed at when no final value was derived.
    pub fn with_simplify(
        mut self,
        simplify: impl Fn(&PropertyValue, &PropertyValue) -> PropertyValue + Send + Sync + 'static,
    ) -> Self {
        self.simplify = Some(Arc::new(simplify));
        self
    }

    /// Register this kind, assigning it the next dense id.
    ///
    /// Registering a second kind under a name that is already taken is a
    /// deterministic error; ids are never reused.
    pub fn register(self, registry: &PropertyKindRegistry) -> Result<PropertyKind, StoreError> {
        registry.register(self)
    }
}

#[derive(Default)]
struct RegistryInner {
    kinds: Vec<KindInfo>,
    by_name: FxHashMap<CompactString, PropertyKind>,
}

/// The append-only registry of property kinds known to a store instance.
///
/// There is deliberately no process-level registry; a registry is created by
/// the driver and shared explicitly with the store and its analyses.
#[derive(Default)]
pub struct PropertyKindRegistry {
    inner: RwLock<RegistryInner>,
}

impl PropertyKindRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn register(&self, builder: PropertyKindBuilder) -> Result<PropertyKind, StoreError> {
        let mut inner = self.inner.write();
        if inner.by_name.contains_key(&builder.name) {
            return Err(StoreError::DuplicateKind { name: builder.name });
        }
        let id = u32::try_from(inner.kinds.len()).expect("property kind table overflow");
        let kind = PropertyKind(id);
        log::debug!(target: "property-store", "registered property kind {kind} ({})", builder.name);
        inner.by_name.insert(builder.name.clone(), kind);
        inner.kinds.push(KindInfo {
            name: builder.name,
            bottom: builder.bottom,
            top: builder.top,
            meet: builder.meet,
            fallback: builder.fallback,
            fast_track: builder.fast_track,
            simplify: builder.simplify,
        });
        Ok(kind)
    }

    /// Register a kind backed by a typed [Lattice] implementation.
    ///
    /// The erased hooks are derived from the trait: `bottom`/`top`/`meet` come
    /// straight from the lattice, and the fallback rule is the provided typed
    /// closure. Fast-track and simplification hooks can be attached via
    /// [Self::register_lattice_with].
    pub fn register_lattice<T, F>(
        &self,
        name: impl AsRef<str>,
        fallback: F,
    ) -> Result<PropertyKind, StoreError>
    where
        T: Lattice,
        F: Fn(FallbackReason) -> T + Send + Sync + 'static,
    {
        self.register(Self::lattice_builder(name, fallback))
    }

    /// Like [Self::register_lattice], but lets the caller attach additional
    /// hooks to the builder before registration.
    pub fn register_lattice_with<T, F>(
        &self,
        name: impl AsRef<str>,
        fallback: F,
        configure: impl FnOnce(PropertyKindBuilder) -> PropertyKindBuilder,
    ) -> Result<PropertyKind, StoreError>
    where
        T: Lattice,
        F: Fn(FallbackReason) -> T + Send + Sync + 'static,
    {
        self.register(configure(Self::lattice_builder(name, fallback)))
    }

    fn lattice_builder<T, F>(name: impl AsRef<str>, fallback: F) -> PropertyKindBuilder
    where
        T: Lattice,
        F: Fn(FallbackReason) -> T + Send + Sync + 'static,
    {
        PropertyKindBuilder::new(
            name,
            PropertyValue::new(T::bottom()),
            PropertyValue::new(T::top()),
            |a, b| {
                let lhs = expect_lattice::<T>(a);
                let rhs = expect_lattice::<T>(b);
                let new_value = lhs.meet(rhs);
                debug_assert_eq!(
                    new_value.meet(lhs),
                    new_value,
                    "expected `meet` to be monotonic"
                );
                debug_assert_eq!(
                    new_value.meet(rhs),
                    new_value,
                    "expected `meet` to be monotonic"
                );
                PropertyValue::new(new_value)
            },
            move |reason| PropertyValue::new(fallback(reason)),
        )
    }

    /// Look up a kind by its registered name.
    pub fn get(&self, name: &str) -> Option<PropertyKind> {
        self.inner.read().by_name.get(name).copied()
    }

    pub fn name(&self, kind: PropertyKind) -> CompactString {
        self.inner.read().kinds[kind.0 as usize].name.clone()
    }

    pub fn bottom(&self, kind: PropertyKind) -> PropertyValue {
        self.inner.read().kinds[kind.0 as usize].bottom.clone()
    }

    pub fn top(&self, kind: PropertyKind) -> PropertyValue {
        self.inner.read().kinds[kind.0 as usize].top.clone()
    }

    /// The greatest lower bound of `a` and `b` in `kind`'s lattice.
    pub fn meet(&self, kind: PropertyKind, a: &PropertyValue, b: &PropertyValue) -> PropertyValue {
        let meet = self.inner.read().kinds[kind.0 as usize].meet.clone();
        meet(a, b)
    }

    /// Value equality in `kind`'s lattice.
    pub fn equals(&self, _kind: PropertyKind, a: &PropertyValue, b: &PropertyValue) -> bool {
        a == b
    }

    /// Returns true if `a ≤ b` in `kind`'s lattice, i.e. `meet(a, b) == a`.
    pub fn leq(&self, kind: PropertyKind, a: &PropertyValue, b: &PropertyValue) -> bool {
        self.meet(kind, a, b) == *a
    }

    pub fn fallback(&self, kind: PropertyKind, reason: FallbackReason) -> PropertyValue {
        let fallback = self.inner.read().kinds[kind.0 as usize].fallback.clone();
        fallback(reason)
    }

    pub fn has_fast_track(&self, kind: PropertyKind) -> bool {
        self.inner.read().kinds[kind.0 as usize].fast_track.is_some()
    }

    /// Consult the kind's fast-track hook, if any.
    pub fn fast_track(&self, kind: PropertyKind, entity: &Entity) -> Option<PropertyValue> {
        let fast_track = self.inner.read().kinds[kind.0 as usize].fast_track.clone()?;
        fast_track(entity)
    }

    /// Collapse an observed interval to a single property using the kind's
    /// simplification rule; `None` if the kind has no such rule.
    pub fn simplify(
        &self,
        kind: PropertyKind,
        lb: &PropertyValue,
        ub: &PropertyValue,
    ) -> Option<PropertyValue> {
        let simplify = self.inner.read().kinds[kind.0 as usize].simplify.clone()?;
        Some(simplify(lb, ub))
    }

    pub fn len(&self) -> usize {
        self.inner.read().kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().kinds.is_empty()
    }
}

fn expect_lattice<T: Lattice>(value: &PropertyValue) -> &T {
    value.downcast_ref::<T>().unwrap_or_else(|| {
        panic!(
            "property value {value:?} does not belong to the lattice `{}`",
            core::any::type_name::<T>()
        )
    })
}

/// This trait must be implemented for any value used as a typed lattice of
/// property values.
///
/// The lattice must be bounded: `bottom` is the most-minimal value (least
/// precise from below), `top` the most-maximal one, and all values are
/// partially ordered between them. `meet` produces the greatest lower bound of
/// its operands and must be commutative, associative, and idempotent, with
/// `top` as its identity. These properties are what guarantee that driving
/// intervals monotonically reaches a fixed point in bounded time.
pub trait Lattice: Any + Clone + Eq + fmt::Debug + Send + Sync {
    /// The most-minimal value of the lattice.
    fn bottom() -> Self;

    /// The most-maximal value of the lattice.
    fn top() -> Self;

    /// The greatest lower bound of `self` and `other`.
    fn meet(&self, other: &Self) -> Self;
}
