pub mod lodestone;
pub mod observability;
pub mod types;
