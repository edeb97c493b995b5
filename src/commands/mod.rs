//! Command handlers
//!
//! Manual start/end/records commands. Every outcome, including errors, is
//! rendered to a user-facing reply; nothing here propagates a failure.

use crate::error::{CloseError, OpenError};
use crate::gateway::{ChannelId, GuildId, UserId};
use crate::session::format::{format_duration, format_timestamp};
use crate::session::{Actor, ClosedSummary, Session, SessionHandle, SessionManager};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Rows returned by `records` when no limit is given
pub const DEFAULT_RECORDS_LIMIT: usize = 10;

/// Upper bound on a requested records limit
pub const MAX_RECORDS_LIMIT: usize = 100;

/// A manual start request
#[derive(Debug, Clone, Deserialize)]
pub struct StartCommand {
    pub guild_id: GuildId,
    pub user_id: UserId,
    /// Voice channel the invoker is currently in, if any
    #[serde(default)]
    pub voice_channel_id: Option<ChannelId>,
    #[serde(default)]
    pub title: Option<String>,
}

/// Structured result of a command
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CommandOutcome {
    Started { session: SessionHandle },
    Ended { summary: ClosedSummary },
    /// Closed, but the row update failed
    EndedNotPersisted { summary: ClosedSummary },
    Records { sessions: Vec<Session> },
    NotInVoice,
    AlreadyOpen,
    NothingOpen,
    UnknownGuild,
    Failed { reason: String },
}

/// Outcome plus its rendered message
#[derive(Debug, Clone, Serialize)]
pub struct CommandReply {
    pub ok: bool,
    pub message: String,
    pub outcome: CommandOutcome,
}

/// Routes commands to the scope of the guild they were issued in
pub struct CommandHandler {
    scopes: HashMap<GuildId, SessionManager>,
    utc_offset_minutes: i32,
}

impl CommandHandler {
    pub fn new(
        managers: impl IntoIterator<Item = SessionManager>,
        utc_offset_minutes: i32,
    ) -> Self {
        let scopes = managers
            .into_iter()
            .map(|m| (m.scope().guild_id, m))
            .collect();
        CommandHandler {
            scopes,
            utc_offset_minutes,
        }
    }

    /// Join the invoker's voice channel and start a manual session
    pub async fn start(&self, cmd: StartCommand) -> CommandReply {
        let outcome = self.run_start(cmd).await;
        self.reply(outcome)
    }

    async fn run_start(&self, cmd: StartCommand) -> CommandOutcome {
        let Some(manager) = self.scopes.get(&cmd.guild_id) else {
            return CommandOutcome::UnknownGuild;
        };
        let Some(channel_id) = cmd.voice_channel_id else {
            return CommandOutcome::NotInVoice;
        };

        let title = cmd
            .title
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());

        match manager.request_start(title, channel_id).await {
            Ok(session) => {
                tracing::info!("Session {} started by user {}", session.id, cmd.user_id);
                CommandOutcome::Started { session }
            }
            Err(OpenError::AlreadyOpen) => CommandOutcome::AlreadyOpen,
            Err(e) => CommandOutcome::Failed {
                reason: e.to_string(),
            },
        }
    }

    /// End the guild's open session
    pub async fn end(&self, guild_id: GuildId) -> CommandReply {
        let outcome = match self.scopes.get(&guild_id) {
            None => CommandOutcome::UnknownGuild,
            Some(manager) => match manager.request_close(Actor::Manual).await {
                Ok(summary) => CommandOutcome::Ended { summary },
                Err(CloseError::NothingOpen) => CommandOutcome::NothingOpen,
                Err(CloseError::NotPersisted { summary, .. }) => {
                    CommandOutcome::EndedNotPersisted { summary }
                }
                Err(e) => CommandOutcome::Failed {
                    reason: e.to_string(),
                },
            },
        };
        self.reply(outcome)
    }

    /// Most recent sessions for the guild
    pub async fn records(&self, guild_id: GuildId, limit: Option<usize>) -> CommandReply {
        let limit = limit
            .unwrap_or(DEFAULT_RECORDS_LIMIT)
            .min(MAX_RECORDS_LIMIT);

        let outcome = match self.scopes.get(&guild_id) {
            None => CommandOutcome::UnknownGuild,
            Some(manager) => match manager.list_recent(limit).await {
                Ok(sessions) => CommandOutcome::Records { sessions },
                Err(e) => {
                    tracing::error!("Failed to list sessions for guild {}: {}", guild_id, e);
                    CommandOutcome::Failed {
                        reason: e.to_string(),
                    }
                }
            },
        };
        self.reply(outcome)
    }

    fn reply(&self, outcome: CommandOutcome) -> CommandReply {
        CommandReply {
            ok: outcome.is_ok(),
            message: outcome.render(self.utc_offset_minutes),
            outcome,
        }
    }
}

impl CommandOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(
            self,
            CommandOutcome::Started { .. }
                | CommandOutcome::Ended { .. }
                | CommandOutcome::Records { .. }
        )
    }

    /// User-facing text
    pub fn render(&self, utc_offset_minutes: i32) -> String {
        match self {
            CommandOutcome::Started { session } => match &session.title {
                Some(title) => format!(
                    "VC に参加しました。タイマーを開始します。（{}）",
                    title
                ),
                None => "VC に参加しました。タイマーを開始します。".to_string(),
            },
            CommandOutcome::Ended { summary } => format!(
                "計測を終了しました。滞在時間: {}",
                format_duration(summary.elapsed())
            ),
            CommandOutcome::EndedNotPersisted { summary } => format!(
                "計測を終了しました。滞在時間: {}（記録の保存に失敗しました）",
                format_duration(summary.elapsed())
            ),
            CommandOutcome::Records { sessions } if sessions.is_empty() => {
                "記録がありません。".to_string()
            }
            CommandOutcome::Records { sessions } => {
                let mut lines = vec!["直近の記録:".to_string()];
                for (i, session) in sessions.iter().enumerate() {
                    let duration = match session.elapsed() {
                        Some(elapsed) => format_duration(elapsed),
                        None => "計測中".to_string(),
                    };
                    let mut line = format!(
                        "{}. {} | {}",
                        i + 1,
                        format_timestamp(session.start_time, utc_offset_minutes),
                        duration
                    );
                    if let Some(title) = &session.title {
                        line.push_str(&format!(" | {}", title));
                    }
                    lines.push(line);
                }
                lines.join("\n")
            }
            CommandOutcome::NotInVoice => {
                "まず VC に参加してからこのコマンドを実行してください。".to_string()
            }
            CommandOutcome::AlreadyOpen => "すでに計測中のセッションがあります。".to_string(),
            CommandOutcome::NothingOpen => "計測中のセッションがありません。".to_string(),
            CommandOutcome::UnknownGuild => "このサーバーは監視対象ではありません。".to_string(),
            CommandOutcome::Failed { reason } => format!("エラーが発生しました: {}", reason),
        }
    }
}
