mod app;
mod clock;
mod config;
mod dialogue;
mod error;
mod input;
mod model;
mod normalize;
mod render;
mod session;
mod sim;
mod storage;

use anyhow::Result;

fn main() -> Result<()> {
    app::run()
}
