use colloquy_config::Config;

/// Strategy for initializing the configuration.
///
/// Creates the default configuration file at `~/colloquy/config.json`.
#[derive(Debug, Clone, Copy)]
pub struct InitStrategy;

impl super::CommandStrategy for InitStrategy {
    type Input = ();

    async fn execute(&self, _input: Self::Input) -> anyhow::Result<()> {
        let config_path = Config::create_config()?;

        println!("✅ Created config file at: {}", config_path.display());
        println!();
        println!("🔧 Configuration options:");
        println!("   - conversation.default_timeout_ms: idle time before a conversation is destroyed");
        println!("   - conversation.concurrent_access_timeout_ms: wait for a conversation in use");
        println!("   - conversation.asynchronous: expire with scheduled tasks instead of sweeps");
        println!("   - logging.level: default log filter when RUST_LOG is unset");
        println!();
        Ok(())
    }
}
