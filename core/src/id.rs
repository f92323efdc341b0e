//! Correlation-id generation (§6.3, Design Note #5). Default is a random UUID v4, overridable
//! for deterministic tests.

use std::sync::Arc;

use uuid::Uuid;

pub trait IdGenerator: Send + Sync {
    fn generate(&self) -> String;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct UuidV4Generator;

impl IdGenerator for UuidV4Generator {
    fn generate(&self) -> String {
        Uuid::new_v4().to_string()
    }
}

pub type SharedIdGenerator = Arc<dyn IdGenerator>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uuid_generator_produces_distinct_ids() {
        let gen = UuidV4Generator;
        let a = gen.generate();
        let b = gen.generate();
        assert_ne!(a, b);
        assert_eq!(a.len(), 36);
    }
}
