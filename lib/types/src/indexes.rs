//! Helper index types for the WebAssembly module index spaces.
use cranelift_entity::entity_impl;

/// Index type of a function signature inside the WebAssembly module.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct SignatureIndex(u32);
entity_impl!(SignatureIndex);

/// Index type of a function (imported or local) inside the WebAssembly
/// module.
///
/// Imported functions come first: a module with `n` function imports gives
/// its first local function the index `n`.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct FunctionIndex(u32);
entity_impl!(FunctionIndex);

/// Index type of a function defined locally inside the WebAssembly module.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct LocalFunctionIndex(u32);
entity_impl!(LocalFunctionIndex);
