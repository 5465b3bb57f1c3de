use clap::Parser;

#[derive(Parser)]
#[command(name = "mingle")]
#[command(version = "0.4.0")]
#[command(about = "A terminal and web client for conversational social-matching servers")]
pub struct Args {
    /// Conversation to show: human, general, or a topic name
    #[arg(default_value = "human")]
    pub chat: String,

    /// Matching server base URL (overrides MINGLE_SERVER and mingle.toml)
    #[arg(long)]
    pub server: Option<String>,

    /// Send one message to the human conversation and print the refreshed
    /// transcript
    #[arg(long)]
    pub send: Option<String>,

    /// Clear the human conversation history
    #[arg(long)]
    pub clear: bool,

    /// Print the ranked match list instead of a transcript
    #[arg(long)]
    pub matches: bool,

    /// Stay attached after the transcript and print messages from the live
    /// history stream as they arrive
    #[arg(long, short)]
    pub follow: bool,

    /// Trigger multi-agent generation for the general room, then print it
    #[arg(long)]
    pub generate: bool,

    /// Turns requested when triggering multi-agent generation
    #[arg(long, default_value = "10")]
    pub turns: u32,

    /// Launch the web UI on localhost instead of terminal output
    #[arg(long)]
    pub web: bool,

    /// Port for the web UI gateway
    #[arg(long)]
    pub port: Option<u16>,

    /// Do not open a browser when the web UI starts
    #[arg(long)]
    pub no_open: bool,
}
