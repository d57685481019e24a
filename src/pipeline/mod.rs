//! Pipeline stages for certificate filing.
//!
//! Each submodule implements exactly one step, so each can be tested on its
//! own and the two external services can be swapped behind a trait.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ encode ──▶ classify ──▶ naming ──▶ store
//! (bytes)   (raster)   (base64)   (VLM)        (folder)   (disk)
//! ```
//!
//! 1. [`input`]: build an [`input::Upload`] from a path, URL or bytes and
//!    reject anything that is not a PDF of acceptable size
//! 2. [`render`]: rasterise the leading pages; runs in `spawn_blocking`
//!    because both backends block
//! 3. [`encode`]: JPEG/PNG-encode and base64-wrap the first page
//! 4. [`classify`]: ask the vision model for the issuer's name; the only
//!    stage with network I/O
//! 5. [`naming`]: turn the model's answer into a safe folder name
//! 6. [`store`]: write the original bytes without overwriting anything

pub mod classify;
pub mod encode;
pub mod input;
pub mod naming;
pub mod render;
pub mod store;
