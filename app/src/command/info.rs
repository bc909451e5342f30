use colloquy_config::Config;

/// Strategy for displaying configuration information.
#[derive(Debug, Clone, Copy)]
pub struct InfoStrategy;

impl super::CommandStrategy for InfoStrategy {
    type Input = Config;

    async fn execute(&self, config: Self::Input) -> anyhow::Result<()> {
        println!("=== colloquy Configuration ===\n");

        println!("Conversation:");
        println!(
            "  Default Timeout: {}",
            format_millis(config.conversation.default_timeout_ms)
        );
        println!(
            "  Concurrent Access Timeout: {}",
            format_millis(config.conversation.concurrent_access_timeout_ms)
        );
        println!(
            "  Expiry: {}",
            if config.conversation.asynchronous {
                "asynchronous (scheduled terminations)"
            } else {
                "synchronous (request-time sweeps)"
            }
        );
        println!();

        println!("Logging:");
        println!("  Level: {}", config.logging.level);

        Ok(())
    }
}

fn format_millis(ms: u64) -> String {
    if ms >= 60_000 && ms % 60_000 == 0 {
        format!("{} min", ms / 60_000)
    } else if ms >= 1000 && ms % 1000 == 0 {
        format!("{} s", ms / 1000)
    } else {
        format!("{ms} ms")
    }
}
