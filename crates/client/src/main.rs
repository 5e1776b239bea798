//! anochat terminal client.
//!
//! Minimal driver around [`SessionController`]: authenticate, connect,
//! search, then chat from stdin. Lines starting with `/` are commands
//! (`/end`, `/cancel`, `/rate <1-5>`, `/quit`); everything else is sent as
//! a message.

use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};

use anochat_client::{
    storage, ApiClient, ClientConfig, LocalUser, SearchPhase, SessionController, SessionSnapshot,
};
use anochat_shared::{Gender, LoginRequest, SearchParams};

#[tokio::main]
async fn main() -> Result<()> {
    {
        use tracing_subscriber::EnvFilter;
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| EnvFilter::new("anochat_client=info")),
            )
            .init();
    }

    let telegram_id: i64 = std::env::var("ANOCHAT_TELEGRAM_ID")
        .context("set ANOCHAT_TELEGRAM_ID to your telegram id")?
        .parse()
        .context("ANOCHAT_TELEGRAM_ID must be an integer")?;
    let config = match std::env::var("ANOCHAT_HOST") {
        Ok(host) => ClientConfig::for_host(&host),
        Err(_) => ClientConfig::default(),
    };

    let api = ApiClient::new(config.api_base_url.clone());
    let auth = api
        .login(&LoginRequest {
            telegram_id,
            platform: Some("cli".to_string()),
        })
        .await
        .context("login failed")?;
    println!("logged in as {} (rating {})", auth.user.telegram_id, auth.user.rating);

    let controller = SessionController::new(config, LocalUser { telegram_id });
    controller
        .connect(&auth.token)
        .await
        .context("socket connect failed")?;

    let params = storage::load_search_params().unwrap_or_else(default_params);
    controller.start_search(&params)?;
    storage::save_search_params(&params);
    println!("searching for a partner...");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut ticker = tokio::time::interval(Duration::from_millis(300));
    let mut view = View::default();

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                view.render(&controller.snapshot());
                controller.clear_error();
            }
            line = lines.next_line() => {
                let Some(line) = line.context("stdin closed")? else { break };
                let input = line.trim();
                let result = match input {
                    "" => Ok(()),
                    "/quit" => break,
                    "/end" => controller.end_chat(None),
                    "/cancel" => controller.cancel_search(),
                    _ if input.starts_with("/rate ") => {
                        match (view.last_chat_id.as_deref(), input[6..].trim().parse::<u8>()) {
                            (Some(chat_id), Ok(score)) => controller.rate_chat(chat_id, score, None),
                            (None, _) => { println!("! nothing to rate yet"); Ok(()) }
                            (_, Err(_)) => { println!("! usage: /rate <1-5>"); Ok(()) }
                        }
                    }
                    text => controller.send_message(text),
                };
                if let Err(err) = result {
                    println!("! {err}");
                }
            }
        }
    }

    controller.disconnect();
    Ok(())
}

fn default_params() -> SearchParams {
    SearchParams {
        my_gender: Gender::Male,
        my_age: 25,
        target_gender: Gender::Any,
        target_age_min: 18,
        target_age_max: 99,
        use_location: false,
        location: None,
    }
}

/// Tracks what was already printed so each tick only renders the delta.
#[derive(Default)]
struct View {
    last_chat_id: Option<String>,
    printed_messages: usize,
    partner_typing: bool,
    was_matched: bool,
}

impl View {
    fn render(&mut self, snapshot: &SessionSnapshot) {
        if let Some(error) = &snapshot.last_error {
            println!("! {error}");
        }

        match (&snapshot.chat, &snapshot.search) {
            (Some(chat), _) => {
                if self.last_chat_id.as_deref() != Some(chat.chat_id.as_str()) {
                    println!(
                        "matched: {:?}, age {} (chat {})",
                        chat.partner.gender, chat.partner.age, chat.chat_id
                    );
                    self.last_chat_id = Some(chat.chat_id.clone());
                    self.printed_messages = 0;
                    self.partner_typing = false;
                    self.was_matched = true;
                }
                for message in &chat.messages[self.printed_messages..] {
                    let who = if message.from_me { "me" } else { "them" };
                    match &message.reply_preview {
                        Some(preview) => println!("[{who}] (re: {preview}) {}", message.content),
                        None => println!("[{who}] {}", message.content),
                    }
                }
                self.printed_messages = chat.messages.len();

                if chat.partner_typing != self.partner_typing {
                    self.partner_typing = chat.partner_typing;
                    if self.partner_typing {
                        println!("(partner is typing...)");
                    }
                }
            }
            (None, SearchPhase::Idle) if self.was_matched => {
                println!("chat ended (use /rate <1-5> to rate, or type to search again)");
                self.was_matched = false;
                self.printed_messages = 0;
            }
            _ => {}
        }
    }
}
