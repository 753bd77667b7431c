use std::{path::PathBuf, sync::Arc};

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use client_core::{
    session::FileCredentialStore, AttachmentUpload, ChatClient, ClientConfig, ThreadState,
};
use shared::domain::{ConversationKind, UserId};

#[derive(Parser, Debug)]
struct Cli {
    #[arg(long, env = "CHAT_SERVER_URL", default_value = "http://127.0.0.1:3000")]
    server_url: String,
    /// Directory holding the persisted credential.
    #[arg(long, env = "CHAT_STATE_DIR", default_value = ".chat-cli")]
    state_dir: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sign in and persist the credential.
    Login { email: String, password: String },
    /// Register a new account and persist the credential.
    Register {
        name: String,
        email: String,
        password: String,
    },
    /// List conversations, direct messages first.
    Conversations,
    /// List the contact directory.
    Contacts,
    /// Start (or find) a direct conversation with a user.
    Direct { user_id: String },
    /// Send a message, optionally attaching a local file.
    Send {
        conversation_id: String,
        content: String,
        #[arg(long)]
        attach: Option<PathBuf>,
    },
    /// Stream a conversation to stdout until interrupted.
    Watch { conversation_id: String },
    /// Sign out and clear the persisted credential.
    Logout,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();
    let cli = Cli::parse();

    let client = ChatClient::new(
        ClientConfig::new(cli.server_url.clone()),
        Box::new(FileCredentialStore::new(&cli.state_dir)),
    );

    match cli.command {
        Command::Login { email, password } => {
            let user = client.sign_in(&email, &password).await?;
            println!("signed in as {} ({})", user.name, user.id.as_str());
        }
        Command::Register {
            name,
            email,
            password,
        } => {
            let user = client.sign_up(&name, &email, &password, None).await?;
            println!("registered as {} ({})", user.name, user.id.as_str());
        }
        Command::Conversations => {
            resume_or_fail(&client).await?;
            let me = client.current_user().map(|user| user.id);
            let conversations = client.fetch_conversations().await?;
            for kind in [ConversationKind::Direct, ConversationKind::Group] {
                let tab = client_core::reconcile::conversations_of_kind(&conversations, kind);
                println!("{kind:?} ({})", tab.len());
                for conversation in tab {
                    let name = me
                        .as_ref()
                        .and_then(|me| conversation.display_name(me))
                        .unwrap_or("(unnamed)");
                    let last = conversation
                        .last_message
                        .as_ref()
                        .map(|message| message.content.as_str())
                        .unwrap_or("");
                    println!("  {}  {name}  {last}", conversation.id.as_str());
                }
            }
        }
        Command::Contacts => {
            resume_or_fail(&client).await?;
            for contact in client.fetch_contacts().await? {
                println!("{}  {}", contact.id.as_str(), contact.name);
            }
        }
        Command::Direct { user_id } => {
            resume_or_fail(&client).await?;
            let push = client
                .start_direct_conversation(&UserId(user_id))
                .await?;
            let status = if push.is_new { "created" } else { "existing" };
            println!("{status} conversation {}", push.conversation.id.as_str());
        }
        Command::Send {
            conversation_id,
            content,
            attach,
        } => {
            resume_or_fail(&client).await?;
            let attachment = match attach {
                Some(path) => {
                    let bytes = std::fs::read(&path)?;
                    let filename = path
                        .file_name()
                        .and_then(|name| name.to_str())
                        .unwrap_or("attachment")
                        .to_string();
                    Some(AttachmentUpload { filename, bytes })
                }
                None => None,
            };
            client
                .send_message(&conversation_id.as_str().into(), &content, attachment)
                .await?;
            println!("sent");
        }
        Command::Watch { conversation_id } => {
            resume_or_fail(&client).await?;
            let thread = ThreadState::attach(client.registry(), conversation_id.as_str().into());
            thread.request_history()?;
            println!("watching {conversation_id}; ctrl-c to stop");

            let mut printed = 0;
            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => break,
                    _ = tokio::time::sleep(std::time::Duration::from_millis(250)) => {
                        let messages = thread.messages();
                        // Thread state is newest-first; print the backlog oldest-first.
                        for message in messages.iter().rev().skip(printed) {
                            println!("[{}] {}: {}",
                                message.created_at.format("%H:%M:%S"),
                                message.sender.name,
                                message.content);
                        }
                        printed = messages.len();
                    }
                }
            }
        }
        Command::Logout => {
            client.sign_out()?;
            println!("signed out");
        }
    }

    Ok(())
}

async fn resume_or_fail(client: &Arc<ChatClient>) -> Result<()> {
    if client.resume().await? {
        Ok(())
    } else {
        Err(anyhow!("not signed in; run `chat-cli login` first"))
    }
}
