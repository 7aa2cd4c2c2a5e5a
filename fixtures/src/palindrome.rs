use fixpoint::{
    AnalysisFn, AnalysisOutcome, ComputationResult, Entity, Ep, Lattice, PropertyKind,
    PropertyKindRegistry, PropertyStore, PropertyValue, analysis_fn,
};

/// Whether a string reads the same in both directions.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Palindromeness {
    NoPalindrome,
    Palindrome,
}

impl Lattice for Palindromeness {
    fn bottom() -> Self {
        Palindromeness::NoPalindrome
    }

    fn top() -> Self {
        Palindromeness::Palindrome
    }

    fn meet(&self, other: &Self) -> Self {
        core::cmp::min(*self, *other)
    }
}

/// A palindrome whose first half is itself a palindrome.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum SuperPalindromeness {
    NoSuperPalindrome,
    SuperPalindrome,
}

impl Lattice for SuperPalindromeness {
    fn bottom() -> Self {
        SuperPalindromeness::NoSuperPalindrome
    }

    fn top() -> Self {
        SuperPalindromeness::SuperPalindrome
    }

    fn meet(&self, other: &Self) -> Self {
        core::cmp::min(*self, *other)
    }
}

/// Wrap a string as an entity for the palindrome analyses.
pub fn text(s: &str) -> Entity {
    Entity::new(s.to_string())
}

pub fn register_palindrome_kinds(
    registry: &PropertyKindRegistry,
) -> (PropertyKind, PropertyKind) {
    let palindrome = registry
        .register_lattice::<Palindromeness, _>("Palindrome", |_| Palindromeness::NoPalindrome)
        .expect("palindrome kind registered twice");
    let super_palindrome = registry
        .register_lattice::<SuperPalindromeness, _>("SuperPalindrome", |_| {
            SuperPalindromeness::NoSuperPalindrome
        })
        .expect("super-palindrome kind registered twice");
    (palindrome, super_palindrome)
}

/// A lazy analysis deriving [Palindromeness] for string entities.
pub fn palindrome_analysis(kind: PropertyKind) -> AnalysisFn {
    analysis_fn(move |_store, entity| {
        let s = entity.downcast_ref::<String>().expect("palindrome entities are strings");
        let value = if is_palindrome(s) {
            Palindromeness::Palindrome
        } else {
            Palindromeness::NoPalindrome
        };
        Ok(ComputationResult::finalized(entity.clone(), kind, PropertyValue::new(value)))
    })
}

/// A lazy analysis deriving [SuperPalindromeness], depending on
/// [Palindromeness] of the entity itself and of its first half.
pub fn super_palindrome_analysis(
    palindrome: PropertyKind,
    super_palindrome: PropertyKind,
) -> AnalysisFn {
    analysis_fn(move |store, entity| {
        let s = entity
            .downcast_ref::<String>()
            .expect("palindrome entities are strings")
            .clone();
        let whole = store.apply(entity, palindrome)?;
        check_whole(store, entity.clone(), s, palindrome, super_palindrome, whole)
    })
}

fn check_whole(
    store: &PropertyStore,
    entity: Entity,
    s: String,
    palindrome: PropertyKind,
    super_palindrome: PropertyKind,
    whole: Ep,
) -> AnalysisOutcome {
    match whole.final_value().and_then(|v| v.downcast_ref::<Palindromeness>()).copied() {
        Some(Palindromeness::Palindrome) => {
            let half: String = s.chars().take(s.chars().count() / 2).collect();
            let half_ep = store.apply(&text(&half), palindrome)?;
            check_half(store, entity, super_palindrome, half_ep)
        }
        Some(Palindromeness::NoPalindrome) => Ok(no_super_palindrome(entity, super_palindrome)),
        None => {
            let e = entity.clone();
            Ok(ComputationResult::interim(
                entity,
                super_palindrome,
                PropertyValue::new(SuperPalindromeness::NoSuperPalindrome),
                PropertyValue::new(SuperPalindromeness::SuperPalindrome),
                [whole],
                Box::new(move |store, ep| {
                    check_whole(store, e, s, palindrome, super_palindrome, ep)
                }),
            ))
        }
    }
}

fn check_half(
    store: &PropertyStore,
    entity: Entity,
    super_palindrome: PropertyKind,
    half: Ep,
) -> AnalysisOutcome {
    match half.final_value().and_then(|v| v.downcast_ref::<Palindromeness>()).copied() {
        Some(Palindromeness::Palindrome) => Ok(ComputationResult::finalized(
            entity,
            super_palindrome,
            PropertyValue::new(SuperPalindromeness::SuperPalindrome),
        )),
        Some(Palindromeness::NoPalindrome) => Ok(no_super_palindrome(entity, super_palindrome)),
        None => {
            let e = entity.clone();
            Ok(ComputationResult::interim(
                entity,
                super_palindrome,
                PropertyValue::new(SuperPalindromeness::NoSuperPalindrome),
                PropertyValue::new(SuperPalindromeness::SuperPalindrome),
                [half],
                Box::new(move |store, ep| check_half(store, e, super_palindrome, ep)),
            ))
        }
    }
}

fn no_super_palindrome(entity: Entity, kind: PropertyKind) -> ComputationResult {
    ComputationResult::finalized(
        entity,
        kind,
        PropertyValue::new(SuperPalindromeness::NoSuperPalindrome),
    )
}

fn is_palindrome(s: &str) -> bool {
    let chars: Vec<char> = s.chars().collect();
    chars.iter().eq(chars.iter().rev())
}
