use clap::Parser;
use colored::*;

use mingle::cli::Args;
use mingle::protocol::Message;
use mingle::state::ChatKey;
use mingle::{config, web, Controller};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let settings = config::load();
    let server = config::resolve_server_url(args.server.as_deref(), &settings);

    let mut controller = Controller::new(&server);
    if let Some(raw) = &settings.capture_program {
        let mut parts = raw.split_whitespace().map(|s| s.to_string());
        if let Some(program) = parts.next() {
            if !mingle::voice::capture_program_available(&program) {
                tracing::warn!(program = %program, "configured capture program not found on PATH");
            }
            controller.set_capture_program(program, parts.collect());
        }
    }

    // Web UI mode
    if args.web {
        let port = args.port.unwrap_or(settings.gateway_port);
        web::serve(controller, port, settings.open_browser && !args.no_open).await?;
        return Ok(());
    }

    // One-shot operations first; each prints and exits.
    if args.clear {
        controller.api().clear_human().await?;
        println!("{}", "Human conversation cleared.".bright_green());
        return Ok(());
    }

    if args.matches {
        print_header(&server, "matches");
        let matches = controller.load_matches().await.to_vec();
        for (idx, m) in matches.iter().enumerate() {
            println!(
                "{:>2}. {}  {}",
                idx + 1,
                m.user_a.bright_white().bold(),
                format!("{}% match", mingle::render::format_score(m.score)).bright_yellow()
            );
            println!("    {}", m.reason.normal());
        }
        print_footer(matches.len(), "matches");
        return Ok(());
    }

    if let Some(text) = &args.send {
        let batch = controller.api().send_human(text).await?;
        print_header(&server, "human");
        print_messages(&batch.messages);
        print_footer(batch.messages.len(), "messages");
        return Ok(());
    }

    let key = ChatKey::parse(&args.chat);

    if args.generate && key == ChatKey::General {
        print_header(&server, key.as_str());
        eprintln!(
            "{}",
            "  Generating multi-agent chat (personas taking turns)…".bright_magenta()
        );
        let batch = controller.api().generate_general(args.turns).await?;
        if batch.messages.is_empty() {
            println!(
                "{}",
                "No messages generated. Add personas first (Profile → Create persona).".yellow()
            );
        } else {
            print_messages(&batch.messages);
        }
        print_footer(batch.messages.len(), "messages");
        return Ok(());
    }

    // Default: print the transcript, then optionally follow the stream.
    // Following the human chat uses the simple-history endpoint, the same
    // transcript the stream feeds.
    print_header(&server, key.as_str());
    let initial = if args.follow && key == ChatKey::Human {
        controller.api().history().await.map(|batch| batch.messages)
    } else {
        controller.fetch_conversation(&key).await
    };
    match initial {
        Ok(messages) if messages.is_empty() => print_empty_notice(&key),
        Ok(messages) => {
            print_messages(&messages);
            print_footer(messages.len(), "messages");
        }
        Err(e) => {
            eprintln!("{} {}", "Could not load conversation:".bright_red(), e);
        }
    }

    if args.follow {
        eprintln!(
            "{}",
            "  Following the live history stream (Ctrl+C to stop)…".bright_blue()
        );
        let mut feed = controller.start_history_stream();
        while let Some(message) = feed.recv().await {
            print_messages(std::slice::from_ref(&message));
        }
        eprintln!("{}", "  Stream closed.".bright_red());
    }

    Ok(())
}

fn print_header(server: &str, what: &str) {
    println!("{}", "MINGLE".bright_cyan().bold());
    println!("{}: {}", "Server".bright_yellow(), server.bright_white());
    println!("{}: {}", "View".bright_yellow(), what);
    println!("{}", "=".repeat(50).bright_blue());
}

fn print_footer(count: usize, noun: &str) {
    println!("{}", "=".repeat(50).bright_blue());
    println!("{} {}.", count, noun);
}

fn print_empty_notice(key: &ChatKey) {
    match key {
        ChatKey::Human => println!("{}", "No messages yet.".yellow()),
        ChatKey::General => {
            println!("{}", "No multi-agent conversation yet.".yellow());
            println!("{}", "Run with --generate to create one.".bright_blue());
        }
        ChatKey::Topic(_) => println!("{}", "No conversation for this topic yet.".yellow()),
    }
}

fn print_messages(messages: &[Message]) {
    for m in messages {
        let mut line = format!("{} {}", m.speaker.bright_cyan().bold(), m.text.normal());
        if !m.reactions.is_empty() {
            let tallies: Vec<String> = m
                .reactions
                .iter()
                .map(|(emoji, count)| format!("{} {}", emoji, count))
                .collect();
            line.push_str(&format!("  {}", tallies.join(" ").dimmed()));
        }
        println!("{}", line);
        if let Some(timestamp) = &m.timestamp {
            println!("  {}", timestamp.dimmed());
        }
    }
}
