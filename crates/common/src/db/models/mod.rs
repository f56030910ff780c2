//! SeaORM entity models
//!
//! Only the patent table is read through an entity; joins and edges are
//! written with raw statements.

mod patent;

pub use patent::{
    Entity as PatentEntity,
    Model as PatentRow,
    ActiveModel as PatentActiveModel,
    Column as PatentColumn,
};
