#[cfg_attr(not(target_arch = "wasm32"), allow(dead_code))]
mod certificate;
#[cfg(any(test, target_arch = "wasm32"))]
mod modal;

#[cfg(not(target_arch = "wasm32"))]
mod backend;
#[cfg(target_arch = "wasm32")]
mod frontend;

#[cfg(not(target_arch = "wasm32"))]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    backend::run().await
}

#[cfg(target_arch = "wasm32")]
fn main() {
    frontend::run();
}
