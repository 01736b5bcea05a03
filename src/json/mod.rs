//! Purpose: Internal JSON decoding boundary between the scanner and the normalizer.
//! Exports: `parse` module with the decode helper and failure categories.
//! Role: Single seam for the parser so callsites avoid ad hoc decode logic.
//! Invariants: Decoding preserves object field order.
//! Invariants: Helper APIs stay small and deterministic (no hidden global state).

pub(crate) mod parse;
