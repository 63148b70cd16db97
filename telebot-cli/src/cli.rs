//! CLI parser.

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "telebot")]
#[command(about = "Telegram long-polling CLI: wait for a message, watch updates", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Overrides BOT_TOKEN.
    #[arg(short, long, global = true)]
    pub token: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Wait until a text message equal to TEXT arrives; prints its chat id.
    Wait {
        #[arg(long)]
        text: String,
        /// Give up after this many seconds (wait forever when omitted).
        #[arg(long)]
        timeout: Option<u64>,
    },
    /// Log every incoming update for a number of seconds.
    Watch {
        #[arg(short, long, default_value = "60")]
        seconds: u64,
    },
}
