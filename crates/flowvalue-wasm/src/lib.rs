//! Flow value decoder as a WASM module for browser inspectors.
//!
//! An inspector holds a snapshot of the runtime's linear memory and the
//! assets-map JSON the runtime was built with. This crate decodes a slot
//! out of that snapshot and hands the result back as JSON.
//!
//! # Usage (JavaScript)
//!
//! ```js
//! import init, { decode_slot_json } from 'flowvalue-wasm';
//!
//! await init();
//!
//! const memory = new Uint8Array(runtime.memory.buffer);
//! const result = JSON.parse(decode_slot_json(memory, slotOffset, assetsJson));
//! // { success: true, value: { x: 1, y: 2 }, valueType: "struct:Point", diagnostics: [] }
//! ```

use flowvalue_marshal::{Diagnostic, HostValue, MarshalSession};
use flowvalue_types::Ptr;
use serde::Serialize;
use wasm_bindgen::prelude::*;

/// Outcome of decoding one slot.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DecodeResult {
    /// `false` only when the catalog could not be loaded.
    pub success: bool,
    pub value: HostValue,
    pub value_type: String,
    pub diagnostics: Vec<Diagnostic>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Decode the slot at `offset` in `memory` against the catalog in
/// `catalog_json`.
pub fn decode_slot(memory: &[u8], offset: u32, catalog_json: &str) -> DecodeResult {
    let mut session = match MarshalSession::from_assets_json(catalog_json) {
        Ok(session) => session,
        Err(e) => {
            return DecodeResult {
                success: false,
                value: HostValue::Undefined,
                value_type: "undefined".to_string(),
                diagnostics: Vec::new(),
                error: Some(e.to_string()),
            }
        }
    };
    let decoded = session.decoder(memory).decode_value(Ptr(offset));
    DecodeResult {
        success: true,
        value: decoded.value,
        value_type: decoded.value_type,
        diagnostics: session.take_diagnostics(),
        error: None,
    }
}

/// Decode a slot from a linear-memory snapshot.
///
/// Returns a JSON string containing a `DecodeResult`:
/// ```json
/// {
///   "success": true,
///   "value": [1, 2, 3],
///   "valueType": "array:integer",
///   "diagnostics": []
/// }
/// ```
///
/// Problems inside the memory image are reported in `diagnostics`; only an
/// unreadable catalog sets `success` to `false` and fills `error`.
#[wasm_bindgen]
pub fn decode_slot_json(memory: &[u8], offset: u32, catalog_json: &str) -> String {
    let result = decode_slot(memory, offset, catalog_json);
    serde_json::to_string(&result).unwrap_or_else(|e| {
        format!(
            r#"{{"success":false,"value":null,"valueType":"undefined","diagnostics":[],"error":"Serialization error: {}"}}"#,
            e
        )
    })
}

/// Return the decoder version string.
#[wasm_bindgen]
pub fn version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}
