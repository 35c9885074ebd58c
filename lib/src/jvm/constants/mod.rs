//! Constant pool: symbolic constants, the read view of a parsed pool, and the pool builder
//!
//! Elements never carry raw pool indices. Anything that refers to the pool holds a [`PoolEntry`],
//! which is a [`Constant`] along with (optionally) the pool and index it was read from. Writing an
//! entry goes through [`ConstantPoolBuilder::index_of`], which either reuses that index (when the
//! pools are compatible) or interns the constant.

mod constant;
mod pool;
mod pool_builder;

pub use constant::*;
pub use pool::ConstantPool;
pub(crate) use pool::{BootstrapTable, POOL_START};
pub use pool_builder::*;
