//! Output generation: the JSON digest files and the static HTML page.
//!
//! # Submodules
//!
//! - [`json`]: Writes the [`DigestDocument`](crate::models::DigestDocument)
//!   and per-batch debug dumps
//! - [`html`]: Renders `latest.json` into a static page
//!
//! # Output Structure
//!
//! ```text
//! data_dir/
//! ├── digest_2026-10-19.json
//! ├── latest.json
//! └── debug/batch_2026-10-19_1.txt
//!
//! docs_dir/
//! ├── index.html
//! └── digest_2026-10-19.html
//! ```

pub mod html;
pub mod json;
