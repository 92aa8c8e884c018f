//! Entity trait: records with a stable identity.

/// Minimal interface shared by courses, materials and quizzes.
pub trait Entity {
    /// Strongly-typed identifier.
    type Id: Copy + Eq + core::hash::Hash + core::fmt::Debug;

    fn id(&self) -> Self::Id;
}
