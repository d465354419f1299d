//! Language-specific data area decoding.
//!
//! Per-function unwind tables, emitted by the compiler and located
//! through the unwinder. The layout, in file order:
//!
//! ```text
//! header:
//!   DE      landing-pad base (tag + value; zero value = function start)
//!   u8      types-table encoding (0xFF = table omitted)
//!   ULEB128 offset from the end of this field to the END of the types table
//!   u8      call-site encoding
//!   ULEB128 call-site table byte length
//! call-site table:   start, length, landing-pad offset (call-site
//!                    encoding each), ULEB128 action selector
//! action table:      pairs of SLEB128 (type index, offset to next);
//!                    the offset is relative to its own first byte
//! types table:       fixed-size entries growing BACKWARDS from the
//!                    table end; entry i sits i*size before the end
//! exception specs:   ULEB128 type-index lists, zero-terminated,
//!                    at positive byte offsets past the types-table end
//! ```
//!
//! Call-site entries are sorted by start offset and do not overlap.

use basalt_core::dwarf::{self, EhEncoding};
use basalt_core::error::{BasaltError, BasaltResult};
use basalt_core::leb128;
use basalt_rtti::TypeDescriptor;
use std::ptr;

// =============================================================================
// Parsed tables
// =============================================================================

/// A function's parsed LSDA header with cursors into its tables.
pub struct LsdaTables {
    lsda: *const u8,
    landing_pad_base: usize,
    types_encoding: EhEncoding,
    types_table_end: *const u8,
    call_site_encoding: EhEncoding,
    call_sites: *const u8,
    action_table: *const u8,
}

/// One call-site table entry, decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallSite {
    /// Code-range start, relative to the function start.
    pub start: usize,
    /// Code-range length in bytes.
    pub length: usize,
    /// Landing-pad offset from the landing-pad base; zero = none.
    pub landing_pad: usize,
    /// Action selector: zero = cleanup only, else action-table offset
    /// plus one.
    pub action: u64,
}

/// One action record: a type index and where the record lives (the
/// personality caches the latter for phase 2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionRecord {
    /// Positive: catch clause type index. Zero: cleanup. Negative:
    /// negated byte offset of an exception-specification list.
    pub type_index: i64,
    /// Address of this record within the action table.
    pub record: *const u8,
}

impl LsdaTables {
    /// Parses an LSDA header.
    ///
    /// # Safety
    ///
    /// `lsda` must point at a well-formed LSDA for a function starting
    /// at `region_start`; the tables must stay mapped for the lifetime
    /// of the returned value and its iterators.
    pub unsafe fn parse(lsda: *const u8, region_start: usize) -> BasaltResult<Self> {
        let mut cursor = lsda;

        let lp_base = unsafe { dwarf::read_encoded_tagged(&mut cursor)? };
        let landing_pad_base = if lp_base == 0 { region_start } else { lp_base };

        let types_encoding = EhEncoding::from_raw(unsafe { cursor.read() });
        cursor = unsafe { cursor.add(1) };
        let types_table_end = if types_encoding.is_omit() {
            ptr::null()
        } else {
            let offset = unsafe { leb128::read_uleb128(&mut cursor) };
            unsafe { cursor.add(offset as usize) }
        };

        let call_site_encoding = EhEncoding::from_raw(unsafe { cursor.read() });
        cursor = unsafe { cursor.add(1) };
        let table_length = unsafe { leb128::read_uleb128(&mut cursor) };

        Ok(Self {
            lsda,
            landing_pad_base,
            types_encoding,
            types_table_end,
            call_site_encoding,
            call_sites: cursor,
            action_table: unsafe { cursor.add(table_length as usize) },
        })
    }

    /// The raw LSDA address this was parsed from.
    #[inline]
    #[must_use]
    pub fn lsda(&self) -> *const u8 {
        self.lsda
    }

    /// Base address landing-pad offsets are relative to.
    #[inline]
    #[must_use]
    pub fn landing_pad_base(&self) -> usize {
        self.landing_pad_base
    }

    /// Absolute landing-pad address for a call site.
    #[inline]
    #[must_use]
    pub fn landing_pad(&self, site: &CallSite) -> usize {
        self.landing_pad_base + site.landing_pad
    }

    /// Iterates the call-site table in file (= start-offset) order.
    #[must_use]
    pub fn call_sites(&self) -> CallSiteIter<'_> {
        CallSiteIter {
            cursor: self.call_sites,
            end: self.action_table,
            encoding: self.call_site_encoding,
            _tables: std::marker::PhantomData,
        }
    }

    /// Iterates an action chain from its call-site selector.
    ///
    /// # Safety
    ///
    /// `selector` must be a non-zero action value decoded from this
    /// LSDA's call-site table.
    #[must_use]
    pub unsafe fn actions(&self, selector: u64) -> ActionIter<'_> {
        ActionIter {
            cursor: unsafe { self.action_table.add(selector as usize - 1) },
            _tables: std::marker::PhantomData,
        }
    }

    /// Decodes the types-table entry for a (positive) type index.
    ///
    /// A null result is the catch-all clause.
    ///
    /// # Safety
    ///
    /// `index` must be a type index decoded from this LSDA.
    pub unsafe fn type_descriptor(&self, index: i64) -> BasaltResult<*const TypeDescriptor> {
        if self.types_table_end.is_null() {
            return Err(BasaltError::MissingTypesTable(index));
        }
        let entry_size = self.types_encoding.fixed_size()?;
        let mut entry = unsafe { self.types_table_end.sub(index as usize * entry_size) };
        let value = unsafe { dwarf::read_encoded(&mut entry, self.types_encoding)? };
        Ok(value as *const TypeDescriptor)
    }

    /// Iterates the listed type indices of an exception specification,
    /// identified by its (negative) action type index.
    ///
    /// # Safety
    ///
    /// `type_index` must be a negative type index decoded from this
    /// LSDA's action table.
    pub unsafe fn exception_spec(&self, type_index: i64) -> BasaltResult<SpecListIter<'_>> {
        if self.types_table_end.is_null() {
            return Err(BasaltError::MissingTypesTable(type_index));
        }
        Ok(SpecListIter {
            cursor: unsafe { self.types_table_end.offset(-type_index as isize) },
            _tables: std::marker::PhantomData,
        })
    }
}

// =============================================================================
// Iterators
// =============================================================================

/// Iterator over call-site entries.
pub struct CallSiteIter<'a> {
    cursor: *const u8,
    end: *const u8,
    encoding: EhEncoding,
    _tables: std::marker::PhantomData<&'a LsdaTables>,
}

impl Iterator for CallSiteIter<'_> {
    type Item = BasaltResult<CallSite>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor >= self.end {
            return None;
        }
        let mut read = || -> BasaltResult<CallSite> {
            unsafe {
                let start = dwarf::read_encoded(&mut self.cursor, self.encoding)?;
                let length = dwarf::read_encoded(&mut self.cursor, self.encoding)?;
                let landing_pad = dwarf::read_encoded(&mut self.cursor, self.encoding)?;
                let action = leb128::read_uleb128(&mut self.cursor);
                Ok(CallSite {
                    start,
                    length,
                    landing_pad,
                    action,
                })
            }
        };
        let entry = read();
        if entry.is_err() {
            // Fuse on a decode error.
            self.cursor = self.end;
        }
        Some(entry)
    }
}

/// Iterator over one call site's chained action records.
pub struct ActionIter<'a> {
    cursor: *const u8,
    _tables: std::marker::PhantomData<&'a LsdaTables>,
}

impl Iterator for ActionIter<'_> {
    type Item = ActionRecord;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor.is_null() {
            return None;
        }
        let record = self.cursor;
        let mut cursor = self.cursor;
        let type_index = unsafe { leb128::read_sleb128(&mut cursor) };
        // The next-record offset is relative to its own first byte;
        // read from a copy so the base stays put.
        let offset_base = cursor;
        let mut peek = cursor;
        let offset = unsafe { leb128::read_sleb128(&mut peek) };
        self.cursor = if offset == 0 {
            ptr::null()
        } else {
            unsafe { offset_base.offset(offset as isize) }
        };
        Some(ActionRecord { type_index, record })
    }
}

/// Iterator over an exception specification's listed type indices.
pub struct SpecListIter<'a> {
    cursor: *const u8,
    _tables: std::marker::PhantomData<&'a LsdaTables>,
}

impl Iterator for SpecListIter<'_> {
    type Item = i64;

    fn next(&mut self) -> Option<Self::Item> {
        let index = unsafe { leb128::read_uleb128(&mut self.cursor) };
        (index != 0).then_some(index as i64)
    }
}
