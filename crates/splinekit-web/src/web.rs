//! WebAssembly entry point.

use wasm_bindgen::prelude::*;

#[wasm_bindgen(start)]
pub fn start() {
    console_error_panic_hook::set_once();

    if let Err(err) = console_log::init_with_level(log::Level::Info) {
        web_sys::console::warn_1(&format!("Logger already initialized: {err}").into());
    }

    log::info!("SplineKit {} loaded", env!("CARGO_PKG_VERSION"));
}
