use std::io::{self, Write};
use std::path::PathBuf;

use clap::Parser;
use colored::Colorize;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use wh0dini_cli::{client_for, parse_repl_line, Cli, CliClient, CliError, Commands, Conversation, ReplInput};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Commands::Repl { stream } = cli.command {
        let client = match client_for(&cli) {
            Ok(client) => client,
            Err(err) => {
                eprintln!("{} {err}", "error:".red());
                std::process::exit(1);
            }
        };
        run_repl(client, stream).await;
        return;
    }

    match wh0dini_cli::run(cli).await {
        Ok(output) => {
            if output.is_empty() {
                println!();
            } else {
                println!("{output}");
            }
        }
        Err(err) => {
            eprintln!("{} {err}", "error:".red());
            std::process::exit(1);
        }
    }
}

async fn run_repl(client: CliClient, stream: bool) {
    let mut editor = match DefaultEditor::new() {
        Ok(editor) => editor,
        Err(err) => {
            eprintln!("error: failed to start REPL: {err}");
            std::process::exit(1);
        }
    };
    let history = history_file();
    let _ = editor.load_history(&history);

    println!("{}", "Wh0Dini-AI interactive chat.".bright_green());
    println!("Type 'quit', 'exit' or 'bye' to end the conversation");

    let mut conversation = Conversation::new();
    loop {
        match editor.readline("you> ") {
            Ok(line) => match parse_repl_line(&line) {
                ReplInput::Empty => continue,
                ReplInput::Exit => {
                    println!("{}", "Goodbye!".bright_green());
                    break;
                }
                ReplInput::Message(message) => {
                    let _ = editor.add_history_entry(message.as_str());
                    conversation.push_user(message);
                    match exchange(&client, &conversation, stream).await {
                        Ok(reply) => conversation.push_assistant(reply),
                        Err(err) => {
                            conversation.rollback_user();
                            eprintln!("{} {err}", "error:".red());
                        }
                    }
                }
            },
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => {
                println!();
                break;
            }
            Err(err) => {
                eprintln!("{} {err}", "error:".red());
                break;
            }
        }
    }

    if let Err(err) = editor.save_history(&history) {
        eprintln!("{} failed to save history: {err}", "warning:".yellow());
    }
}

async fn exchange(
    client: &CliClient,
    conversation: &Conversation,
    stream: bool,
) -> Result<String, CliError> {
    if !stream {
        println!("{}", "thinking...".dimmed());
        let reply = client.chat(conversation.messages()).await?;
        println!("{} {}", "wh0dini>".bright_magenta(), reply.response);
        return Ok(reply.response);
    }

    print!("{} ", "wh0dini>".bright_magenta());
    let _ = io::stdout().flush();
    let result = client
        .chat_stream(conversation.messages(), |delta| {
            print!("{delta}");
            let _ = io::stdout().flush();
        })
        .await;
    println!();
    Ok(result?.text)
}

fn history_file() -> PathBuf {
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".wh0dini-cli-history");
    }
    PathBuf::from(".wh0dini-cli-history")
}
