//! Read-only export formats over store snapshots.

pub mod csv;
