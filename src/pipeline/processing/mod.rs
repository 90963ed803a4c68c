pub mod aggregate;
pub mod derive;
pub mod normalize;
