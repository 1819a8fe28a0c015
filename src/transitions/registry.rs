use std::collections::HashMap;

use crate::transitions::{
    DipTransition, FadeTransition, SlideTransition, TransitionEffect, WipeTransition,
};
use crate::video::TransitionType;

/// Registry mapping each transition type to its blend implementation
///
/// `TransitionType::None` is deliberately absent: a junction without a
/// transition never reaches the compositor as a blended segment.
pub struct TransitionRegistry {
    effects: HashMap<TransitionType, Box<dyn TransitionEffect>>,
}

impl TransitionRegistry {
    /// Create a new registry with all built-in transitions
    pub fn new() -> Self {
        let mut registry = Self {
            effects: HashMap::new(),
        };
        registry.register_builtin_transitions();
        registry
    }

    fn register_builtin_transitions(&mut self) {
        self.register(Box::new(FadeTransition::new()));
        self.register(Box::new(DipTransition::black()));
        self.register(Box::new(DipTransition::white()));
        self.register(Box::new(SlideTransition::left()));
        self.register(Box::new(SlideTransition::right()));
        self.register(Box::new(WipeTransition::left()));
        self.register(Box::new(WipeTransition::right()));
    }

    /// Register (or replace) the effect for its transition type
    pub fn register(&mut self, effect: Box<dyn TransitionEffect>) {
        self.effects.insert(effect.kind(), effect);
    }

    pub fn get(&self, kind: TransitionType) -> Option<&dyn TransitionEffect> {
        self.effects.get(&kind).map(|effect| effect.as_ref())
    }

    pub fn has(&self, kind: TransitionType) -> bool {
        self.effects.contains_key(&kind)
    }

    /// Names of all registered transitions
    pub fn available(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.effects.values().map(|e| e.name()).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.effects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }
}

impl Default for TransitionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_blending_type_is_registered() {
        let registry = TransitionRegistry::new();

        for kind in TransitionType::ALL {
            if kind == TransitionType::None {
                assert!(!registry.has(kind));
            } else {
                let effect = registry.get(kind).unwrap();
                assert_eq!(effect.kind(), kind);
                assert_eq!(effect.name(), kind.name());
            }
        }
        assert_eq!(registry.len(), 7);
    }

    #[test]
    fn test_available_names_are_sorted() {
        let registry = TransitionRegistry::new();
        let names = registry.available();
        assert_eq!(names.first(), Some(&"fade"));
        assert_eq!(names.last(), Some(&"wiperight"));
    }
}
