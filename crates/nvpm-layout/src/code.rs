//! Code regions and function lookup.

use std::collections::HashMap;

use crate::FunctionId;

/// A run of machine code starting at a known address.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CodeRegion<'a> {
    /// Address of the first byte.
    pub address: u64,
    pub bytes: &'a [u8],
}

impl<'a> CodeRegion<'a> {
    pub const fn new(address: u64, bytes: &'a [u8]) -> Self {
        Self { address, bytes }
    }

    pub const fn len(&self) -> usize {
        self.bytes.len()
    }

    pub const fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Bytes starting `offset` bytes in, or `None` past the end.
    pub fn tail(&self, offset: usize) -> Option<&'a [u8]> {
        self.bytes.get(offset..).filter(|rest| !rest.is_empty())
    }
}

/// Finds the entry point of a driver function.
///
/// Returns `None` when the symbol is absent from the loaded image.
pub trait FunctionLocator {
    fn locate(&self, function: FunctionId) -> Option<CodeRegion<'_>>;
}

/// Loaded code bytes plus a symbol table.
#[derive(Clone, Debug, Default)]
pub struct CodeImage {
    base: u64,
    bytes: Vec<u8>,
    symbols: HashMap<String, u64>,
}

impl CodeImage {
    pub fn new(base: u64, bytes: Vec<u8>) -> Self {
        Self {
            base,
            bytes,
            symbols: HashMap::new(),
        }
    }

    /// Add a symbol at an absolute address.
    #[must_use]
    pub fn with_symbol(mut self, name: impl Into<String>, address: u64) -> Self {
        self.symbols.insert(name.into(), address);
        self
    }

    pub fn define(&mut self, name: impl Into<String>, address: u64) {
        self.symbols.insert(name.into(), address);
    }

    pub const fn base(&self) -> u64 {
        self.base
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Address of a symbol, if defined.
    pub fn symbol(&self, name: &str) -> Option<u64> {
        self.symbols.get(name).copied()
    }

    /// Region from `address` to the end of the image.
    pub fn region_at(&self, address: u64) -> Option<CodeRegion<'_>> {
        let start = usize::try_from(address.checked_sub(self.base)?).ok()?;
        let bytes = self.bytes.get(start..)?;
        Some(CodeRegion::new(address, bytes))
    }

    /// The whole image as one region.
    pub fn region(&self) -> CodeRegion<'_> {
        CodeRegion::new(self.base, &self.bytes)
    }
}

impl FunctionLocator for CodeImage {
    fn locate(&self, function: FunctionId) -> Option<CodeRegion<'_>> {
        self.region_at(self.symbol(function.symbol())?)
    }
}
