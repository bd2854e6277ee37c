//! Note Porter - note import/export pipeline.
//!
//! Converts single Markdown files, Evernote ENEX archives and Obsidian
//! vaults into a local note store, and exports stored notes back out as
//! Markdown, HTML or PDF. Both directions run as sequential batches that
//! report progress per item and never abort on a single bad item.

pub mod application;
pub mod cli;
pub mod domain;
pub mod infrastructure;
