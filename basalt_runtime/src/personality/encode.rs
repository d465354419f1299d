//! LSDA emission.
//!
//! The write-side twin of [`super::lsda`]: the Basalt compiler back end
//! builds each function's table through this builder, and the test
//! suites use it to drive the personality against synthetic frames.
//!
//! Emitted shape: omitted landing-pad base (offsets are function-
//! relative), machine-word absolute types-table entries, ULEB128
//! call-site fields. Chained action records are laid out back to back,
//! so every next-record offset is one (the byte length of the offset
//! field itself) and the last record's is zero.

use basalt_core::dwarf::{self, EhEncoding};
use basalt_core::error::BasaltResult;
use basalt_core::leb128;
use basalt_rtti::TypeDescriptor;
use smallvec::SmallVec;

/// One planned call-site entry.
struct CallSiteSpec {
    start: usize,
    length: usize,
    landing_pad: usize,
    chain: SmallVec<[i64; 4]>,
}

/// Builder for a function's language-specific data area.
///
/// Register catch types and exception specifications first, then add
/// call sites referencing them, in ascending start order, and
/// [`build`](Self::build) the byte table.
#[derive(Default)]
pub struct LsdaBuilder {
    types: Vec<Option<&'static TypeDescriptor>>,
    specs: Vec<SmallVec<[u64; 4]>>,
    sites: Vec<CallSiteSpec>,
}

impl LsdaBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a catch clause type; `None` is the catch-all clause.
    ///
    /// Returns the positive type index to use in action chains.
    pub fn catch_type(&mut self, ty: Option<&'static TypeDescriptor>) -> i64 {
        self.types.push(ty);
        self.types.len() as i64
    }

    /// Registers an exception specification listing previously
    /// registered type indices.
    ///
    /// Returns the negative index to use in action chains.
    pub fn exception_spec(&mut self, listed: &[i64]) -> i64 {
        self.specs
            .push(listed.iter().map(|&index| index as u64).collect());
        -(self.specs.len() as i64)
    }

    /// Adds a call site covering `[start, start + length)` with an
    /// action chain of catch/spec indices (`0` is a cleanup action).
    ///
    /// An empty chain marks a cleanup-only landing pad; a zero
    /// `landing_pad` marks a range with nothing to run at all.
    pub fn call_site(
        &mut self,
        start: usize,
        length: usize,
        landing_pad: usize,
        chain: &[i64],
    ) -> &mut Self {
        self.sites.push(CallSiteSpec {
            start,
            length,
            landing_pad,
            chain: chain.iter().copied().collect(),
        });
        self
    }

    /// Adds a cleanup-only call site.
    pub fn cleanup_site(&mut self, start: usize, length: usize, landing_pad: usize) -> &mut Self {
        self.call_site(start, length, landing_pad, &[])
    }

    /// Emits the table bytes.
    pub fn build(&self) -> BasaltResult<Vec<u8>> {
        // Exception-spec lists live past the types-table end; the lead
        // pad byte keeps every list at a non-zero (negatable) offset.
        let mut spec_offsets = Vec::with_capacity(self.specs.len());
        let mut spec_bytes = vec![0u8];
        for list in &self.specs {
            spec_offsets.push(spec_bytes.len() as i64);
            for &index in list {
                leb128::write_uleb128(&mut spec_bytes, index);
            }
            spec_bytes.push(0);
        }

        // Action table, remembering each site's selector.
        let mut actions = Vec::new();
        let mut selectors = Vec::with_capacity(self.sites.len());
        for site in &self.sites {
            if site.chain.is_empty() {
                selectors.push(0u64);
                continue;
            }
            selectors.push(actions.len() as u64 + 1);
            for (position, &entry) in site.chain.iter().enumerate() {
                let type_index = if entry < 0 {
                    -spec_offsets[(-entry - 1) as usize]
                } else {
                    entry
                };
                leb128::write_sleb128(&mut actions, type_index);
                let last = position + 1 == site.chain.len();
                actions.push(if last { 0x00 } else { 0x01 });
            }
        }

        // Call-site table, every field ULEB128.
        let mut call_sites = Vec::new();
        for (site, &selector) in self.sites.iter().zip(&selectors) {
            leb128::write_uleb128(&mut call_sites, site.start as u64);
            leb128::write_uleb128(&mut call_sites, site.length as u64);
            leb128::write_uleb128(&mut call_sites, site.landing_pad as u64);
            leb128::write_uleb128(&mut call_sites, selector);
        }

        // Types table, grown backwards: highest index at the lowest
        // address, index one right before the table end.
        let has_types = !self.types.is_empty() || !self.specs.is_empty();
        let mut types_bytes = Vec::new();
        for &ty in self.types.iter().rev() {
            let value = ty.map_or(0, |t| t as *const TypeDescriptor as usize);
            dwarf::write_encoded(&mut types_bytes, EhEncoding::ABSPTR, value)?;
        }

        let mut out = Vec::new();
        out.push(EhEncoding::OMIT.as_raw());
        if has_types {
            out.push(EhEncoding::ABSPTR.as_raw());
            let to_types_end = 1
                + leb128::uleb128_len(call_sites.len() as u64)
                + call_sites.len()
                + actions.len()
                + types_bytes.len();
            leb128::write_uleb128(&mut out, to_types_end as u64);
        } else {
            out.push(EhEncoding::OMIT.as_raw());
        }
        out.push(EhEncoding::ULEB128.as_raw());
        leb128::write_uleb128(&mut out, call_sites.len() as u64);
        out.extend_from_slice(&call_sites);
        out.extend_from_slice(&actions);
        if has_types {
            out.extend_from_slice(&types_bytes);
            if !self.specs.is_empty() {
                out.extend_from_slice(&spec_bytes);
            }
        }
        Ok(out)
    }
}
