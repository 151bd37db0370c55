use std::collections::HashSet;

use anyhow::Result;
use chrono::{DateTime, Local, Utc};
use tokio::io::{AsyncBufReadExt, BufReader};

use super::open_store;
use crate::campaigns;
use crate::config::Config;
use crate::leads::{self, LeadFilter, ScoreTier};
use crate::models::{Campaign, Lead, Message};
use crate::outbound::WebhookClient;
use crate::overlay::is_temporary_id;
use crate::sync::{ChangeFeed, ChangeRelay, ConversationSync, SyncSettings};
use crate::utils::truncate_chars;
use crate::viewer::ConversationViewer;

pub(super) async fn leads(
    config: &Config,
    status: Option<String>,
    score: Option<String>,
    search: Option<String>,
) -> Result<()> {
    let filter = LeadFilter::from_params(status.as_deref(), score.as_deref(), search)?;
    let store = open_store(config)?;
    let leads = filter.apply(leads::list_leads(store.as_ref()).await, &HashSet::new());

    if leads.is_empty() {
        println!("No leads.");
        return Ok(());
    }
    println!(
        "{:<8} {:<24} {:<16} {:>5} {:<6} STATUS",
        "ID", "NAME", "PHONE", "SCORE", "TIER"
    );
    for lead in &leads {
        println!("{}", lead_line(lead));
    }
    println!("\n{} lead(s)", leads.len());
    Ok(())
}

pub(super) async fn campaigns(config: &Config, active: bool) -> Result<()> {
    let store = open_store(config)?;
    let now = Utc::now();
    let campaigns = if active {
        campaigns::active_campaigns(store.as_ref(), now).await
    } else {
        campaigns::list_campaigns(store.as_ref()).await
    };

    if campaigns.is_empty() {
        println!("No campaigns.");
        return Ok(());
    }
    for campaign in &campaigns {
        println!("{}", campaign_line(campaign, now));
    }
    Ok(())
}

/// Interactive conversation view. With `push_from`, change events accepted
/// by that gateway trigger refreshes between interval ticks.
pub(super) async fn chat(
    config: &Config,
    lead_id: &str,
    manual: bool,
    push_from: Option<&str>,
) -> Result<()> {
    let store = open_store(config)?;
    let Some(lead) = leads::find_lead(store.as_ref(), lead_id).await? else {
        anyhow::bail!("Lead {} not found", lead_id);
    };

    let feed = ChangeFeed::default();
    let relay = push_from.map(|url| ChangeRelay::spawn(url, feed.clone()));
    let sync = ConversationSync::new(store, feed, SyncSettings::from(&config.sync));
    let webhook = WebhookClient::from_config(&config.backend);
    let mut viewer = ConversationViewer::new(sync, webhook, config.whatsapp.clone());
    viewer.set_manual_mode(manual);
    println!(
        "Chatting with {} ({}). /manual toggles manual mode, /reprocess [text] re-runs the bot, /quit exits.",
        lead.name, lead.phone
    );
    viewer.select_lead(lead);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut printed = HashSet::new();
    loop {
        tokio::select! {
            changed = viewer.changed() => {
                if !changed {
                    break;
                }
                print_unseen(&viewer.messages(), &mut printed);
            }
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                match ChatCommand::parse(&line) {
                    ChatCommand::Quit => break,
                    ChatCommand::Empty => {}
                    ChatCommand::ToggleManual => {
                        let enabled = !viewer.manual_mode();
                        viewer.set_manual_mode(enabled);
                        println!("manual mode {}", if enabled { "on" } else { "off" });
                    }
                    ChatCommand::Reprocess(text) => {
                        let text = text.or_else(|| last_customer_text(&viewer.messages()));
                        match text {
                            Some(text) => match viewer.reprocess(&text).await {
                                Ok(_) => println!("reprocess requested"),
                                Err(e) => eprintln!("! {}", e.alert_message()),
                            },
                            None => eprintln!("! nothing to reprocess"),
                        }
                    }
                    ChatCommand::Send(text) => {
                        let result = viewer.send(&text).await;
                        print_unseen(&viewer.messages(), &mut printed);
                        if let Err(e) = result {
                            eprintln!("! {}", e.alert_message());
                        }
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    viewer.close();
    drop(relay);
    Ok(())
}

/// One line of interactive chat input.
#[derive(Debug, PartialEq, Eq)]
pub(super) enum ChatCommand {
    Empty,
    Quit,
    ToggleManual,
    /// `/reprocess` with optional text; without it the last customer message is used.
    Reprocess(Option<String>),
    Send(String),
}

impl ChatCommand {
    pub(super) fn parse(line: &str) -> Self {
        let line = line.trim();
        match line {
            "" => Self::Empty,
            "/quit" | "/exit" => Self::Quit,
            "/manual" => Self::ToggleManual,
            _ => match line.strip_prefix("/reprocess") {
                Some(rest) if rest.is_empty() || rest.starts_with(' ') => {
                    let rest = rest.trim();
                    Self::Reprocess((!rest.is_empty()).then(|| rest.to_string()))
                }
                _ => Self::Send(line.to_string()),
            },
        }
    }
}

fn last_customer_text(messages: &[Message]) -> Option<String> {
    messages
        .iter()
        .rev()
        .map(|m| m.customer_text.trim())
        .find(|text| !text.is_empty())
        .map(str::to_string)
}

fn print_unseen(messages: &[Message], printed: &mut HashSet<String>) {
    for line in unseen_lines(messages, printed) {
        println!("{}", line);
    }
}

/// Lines for every message whose id is not in `printed`, recording those ids.
/// A confirmed row may sort before entries already shown, so position in the
/// merged view says nothing about what is new.
pub(super) fn unseen_lines(messages: &[Message], printed: &mut HashSet<String>) -> Vec<String> {
    messages
        .iter()
        .filter(|message| printed.insert(message.id.clone()))
        .flat_map(message_lines)
        .collect()
}

pub(super) fn lead_line(lead: &Lead) -> String {
    format!(
        "{:<8} {:<24} {:<16} {:>5} {:<6} {}",
        truncate_chars(&lead.id, 8),
        truncate_chars(&lead.name, 24),
        lead.phone,
        lead.score,
        ScoreTier::of(lead.score).label(),
        lead.status.as_str()
    )
}

pub(super) fn campaign_line(campaign: &Campaign, now: DateTime<Utc>) -> String {
    format!(
        "{} {} [{} .. {}]{} {} | {}",
        campaign.id,
        campaign.name,
        campaign.starts_at.format("%Y-%m-%d %H:%M"),
        campaign.ends_at.format("%Y-%m-%d %H:%M"),
        if campaign.is_active_at(now) { " active" } else { "" },
        campaign.offer,
        campaign.products.join(", ")
    )
}

pub(super) fn message_lines(message: &Message) -> Vec<String> {
    let time = message.timestamp.with_timezone(&Local).format("%H:%M");
    let pending = if is_temporary_id(&message.id) {
        " (sending)"
    } else {
        ""
    };
    let mut lines = Vec::with_capacity(2);
    if !message.customer_text.is_empty() {
        lines.push(format!("[{}] customer: {}{}", time, message.customer_text, pending));
    }
    if let Some(reply) = &message.bot_text {
        let who = message.responded_by.as_deref().unwrap_or("bot");
        lines.push(format!("[{}] {}: {}{}", time, who, reply, pending));
    }
    lines
}
