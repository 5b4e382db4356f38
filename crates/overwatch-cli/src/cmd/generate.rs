use crate::output::print_json;
use overwatch_core::Generator;
use std::path::Path;

use super::load_config;

pub fn run(config_path: &Path, prompt: &str, schema: &str) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let generator = Generator::from_config(&config.gateway)?;

    let rt = tokio::runtime::Runtime::new()?;
    let artifact = rt.block_on(generator.generate(prompt, schema))?;
    print_json(&artifact)
}
