use super::types::{
    ApiResponse, ChatTarget, MessagePart, SendDocumentParams, SendMessageParams, SendPhotoParams,
};
use crate::models::proxy::Proxy;
use crate::transport::{self, TransportError};
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use serde::Serialize;
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::{Arc, Mutex, RwLock};
use thiserror::Error;

const DEFAULT_API_BASE: &str = "https://api.telegram.org";

const GLOBAL_MESSAGES_PER_SECOND: u32 = 25;
const GLOBAL_BURST: u32 = 50;
const CHAT_MESSAGES_PER_SECOND: u32 = 1;
const CHAT_BURST: u32 = 2;

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("dispatch canceled")]
    Canceled,

    #[error(transparent)]
    Proxy(#[from] TransportError),

    #[error("sending part {part_index} to chat {chat}: {message}")]
    Send {
        chat: String,
        part_index: usize,
        message: String,
    },
}

/// One Bot API binding. The token is baked into the URL and deliberately
/// not exposed through Debug or error text.
struct BotApi {
    http: reqwest::Client,
    api_url: String,
}

impl BotApi {
    fn new(api_base: &str, token: &str, http: reqwest::Client) -> BotApi {
        BotApi {
            http,
            api_url: format!("{api_base}/bot{token}"),
        }
    }

    async fn call<P: Serialize>(&self, method: &str, params: &P) -> Result<(), String> {
        let url = format!("{}/{method}", self.api_url);
        let response = self
            .http
            .post(&url)
            .json(params)
            .send()
            .await
            .map_err(|e| format!("{method}: {}", without_url(e)))?;

        let status = response.status();
        let parsed: ApiResponse = response
            .json()
            .await
            .map_err(|e| format!("{method}: invalid response: {}", without_url(e)))?;

        if !parsed.ok {
            let description = parsed
                .description
                .unwrap_or_else(|| format!("status {status}"));
            return Err(format!("{method}: {description}"));
        }
        Ok(())
    }
}

/// reqwest errors carry the request URL, which here contains the bot token.
fn without_url(err: reqwest::Error) -> String {
    err.without_url().to_string()
}

/// Sends formatted message parts under the platform's rate limits: one
/// global bucket across all bots and one bucket per chat, acquired in that
/// order before every part.
pub struct Dispatcher {
    api_base: String,
    bots: RwLock<HashMap<String, Arc<BotApi>>>,
    global_limiter: DirectLimiter,
    chat_limiters: Mutex<HashMap<String, Arc<DirectLimiter>>>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

fn nonzero(n: u32) -> NonZeroU32 {
    NonZeroU32::new(n).expect("rate limit constants are nonzero")
}

impl Dispatcher {
    pub fn new() -> Dispatcher {
        Self::with_api_base(DEFAULT_API_BASE.to_string())
    }

    /// Test seam: points the dispatcher at a mock Bot API server.
    pub fn with_api_base(api_base: String) -> Dispatcher {
        Dispatcher {
            api_base,
            bots: RwLock::new(HashMap::new()),
            global_limiter: RateLimiter::direct(
                Quota::per_second(nonzero(GLOBAL_MESSAGES_PER_SECOND))
                    .allow_burst(nonzero(GLOBAL_BURST)),
            ),
            chat_limiters: Mutex::new(HashMap::new()),
        }
    }

    fn bot_api(&self, token: &str, proxy: Option<&Proxy>) -> Result<Arc<BotApi>, DispatchError> {
        {
            let bots = self.bots.read().expect("bot cache lock poisoned");
            if let Some(api) = bots.get(token) {
                return Ok(api.clone());
            }
        }

        let mut bots = self.bots.write().expect("bot cache lock poisoned");
        // Double-checked: another task may have built it while we waited.
        if let Some(api) = bots.get(token) {
            return Ok(api.clone());
        }
        let http = transport::client_for(proxy)?;
        let api = Arc::new(BotApi::new(&self.api_base, token, http));
        bots.insert(token.to_string(), api.clone());
        Ok(api)
    }

    fn chat_limiter(&self, chat_id: &str) -> Arc<DirectLimiter> {
        let mut limiters = self.chat_limiters.lock().expect("chat limiter lock poisoned");
        limiters
            .entry(chat_id.to_string())
            .or_insert_with(|| {
                Arc::new(RateLimiter::direct(
                    Quota::per_second(nonzero(CHAT_MESSAGES_PER_SECOND))
                        .allow_burst(nonzero(CHAT_BURST)),
                ))
            })
            .clone()
    }

    /// Sends `parts` in order. The first failure aborts the remainder; the
    /// caller decides what that means for item progress. No retries here;
    /// redelivery policy belongs to the feed worker and dedup layer.
    pub async fn send(
        &self,
        bot_token: &str,
        chat_id: &str,
        parts: &[MessagePart],
        proxy: Option<&Proxy>,
    ) -> Result<(), DispatchError> {
        let api = self.bot_api(bot_token, proxy)?;
        let target = ChatTarget::parse(chat_id);

        for (part_index, part) in parts.iter().enumerate() {
            self.global_limiter.until_ready().await;
            self.chat_limiter(chat_id).until_ready().await;

            let result = match part {
                MessagePart::Text { text, parse_mode } => {
                    api.call(
                        "sendMessage",
                        &SendMessageParams {
                            chat_id: &target,
                            text,
                            parse_mode: *parse_mode,
                        },
                    )
                    .await
                }
                MessagePart::Photo {
                    photo_url,
                    caption,
                    parse_mode,
                } => {
                    api.call(
                        "sendPhoto",
                        &SendPhotoParams {
                            chat_id: &target,
                            photo: photo_url,
                            caption,
                            parse_mode: *parse_mode,
                        },
                    )
                    .await
                }
                MessagePart::Document {
                    document_url,
                    caption,
                    parse_mode,
                    ..
                } => {
                    api.call(
                        "sendDocument",
                        &SendDocumentParams {
                            chat_id: &target,
                            document: document_url,
                            caption,
                            parse_mode: *parse_mode,
                        },
                    )
                    .await
                }
            };

            result.map_err(|message| DispatchError::Send {
                chat: chat_id.to_string(),
                part_index,
                message,
            })?;
        }
        Ok(())
    }
}
