//! Connection supervisor: owns the single WebSocket, runs the receive loop
//! and reconnects after a fixed delay whenever the connection ends.

use std::{sync::Arc, time::Duration};

use {
    botlink_config::BotConfig,
    botlink_plugins::Dispatcher,
    botlink_protocol::{Frame, Segment, command::send_private_msg},
    botlink_scheduler::Scheduler,
    futures::{SinkExt, StreamExt},
    secrecy::{ExposeSecret, Secret},
    tokio::sync::mpsc,
    tokio_tungstenite::{
        connect_async,
        tungstenite::{
            Message,
            client::IntoClientRequest,
            http::{HeaderValue, Request, header::AUTHORIZATION},
        },
    },
    tracing::{debug, error, info, warn},
};

#[cfg(feature = "metrics")]
use botlink_metrics::{
    counter, dispatch as dispatch_metrics, gateway as gateway_metrics, gauge, labels,
};

use crate::{
    error::{Error, Result},
    outbound::GatewayOutbound,
};

/// Connection settings.
#[derive(Clone)]
pub struct SupervisorOptions {
    pub url: String,
    pub access_token: Option<Secret<String>>,
    pub reconnect_delay: Duration,
    pub handshake_timeout: Duration,
    /// Responses whose echo contains one of these are logged at debug level.
    pub quiet_echoes: Vec<String>,
}

impl SupervisorOptions {
    pub fn from_config(config: &BotConfig) -> Self {
        Self {
            url: config.gateway.url.clone(),
            access_token: config.gateway.access_token.clone(),
            reconnect_delay: Duration::from_millis(config.gateway.reconnect_delay_ms),
            handshake_timeout: Duration::from_millis(config.gateway.handshake_timeout_ms),
            quiet_echoes: config.dispatch.quiet_echoes.clone(),
        }
    }

    fn is_quiet(&self, echo: &str) -> bool {
        self.quiet_echoes
            .iter()
            .any(|quiet| !quiet.is_empty() && echo.contains(quiet.as_str()))
    }
}

/// Everything a live connection needs besides the write queue.
struct Link {
    options: SupervisorOptions,
    dispatcher: Arc<Dispatcher>,
    scheduler: Arc<Scheduler>,
    outbound: GatewayOutbound,
}

pub struct Supervisor {
    link: Link,
    write_rx: mpsc::UnboundedReceiver<String>,
}

impl Supervisor {
    pub fn new(
        options: SupervisorOptions,
        dispatcher: Arc<Dispatcher>,
        scheduler: Arc<Scheduler>,
        outbound: GatewayOutbound,
        write_rx: mpsc::UnboundedReceiver<String>,
    ) -> Self {
        Self {
            link: Link {
                options,
                dispatcher,
                scheduler,
                outbound,
            },
            write_rx,
        }
    }

    /// Connect, serve, and reconnect forever.
    pub async fn run(self) {
        let Self { link, mut write_rx } = self;
        let mut attempt: u64 = 0;

        loop {
            attempt += 1;
            info!(url = %link.options.url, attempt, "connecting to gateway");

            match link.connect_and_run(&mut write_rx).await {
                Ok(()) => info!("gateway connection closed"),
                Err(e) => {
                    #[cfg(feature = "metrics")]
                    counter!(gateway_metrics::CONNECTION_ERRORS_TOTAL).increment(1);
                    error!(error = %e, "gateway connection error");
                },
            }

            #[cfg(feature = "metrics")]
            gauge!(gateway_metrics::CONNECTED).set(0.0);

            let delay = link.options.reconnect_delay;
            info!(delay_ms = delay.as_millis() as u64, "reconnecting after delay");
            tokio::time::sleep(delay).await;
        }
    }
}

/// Handshake request, with a bearer token when one is configured.
fn build_request(url: &str, token: Option<&Secret<String>>) -> Result<Request<()>> {
    let mut request = url.into_client_request()?;
    if let Some(token) = token {
        let value = HeaderValue::from_str(&format!("Bearer {}", token.expose_secret()))?;
        request.headers_mut().insert(AUTHORIZATION, value);
    }
    Ok(request)
}

impl Link {
    /// Single connection: handshake, recovery and report, then pump frames
    /// both ways until either side ends.
    async fn connect_and_run(&self, write_rx: &mut mpsc::UnboundedReceiver<String>) -> Result<()> {
        let request = build_request(&self.options.url, self.options.access_token.as_ref())?;
        let (ws_stream, _response) =
            tokio::time::timeout(self.options.handshake_timeout, connect_async(request))
                .await
                .map_err(|_| Error::connection("handshake timed out"))??;
        let (mut ws_sink, mut ws_reader) = ws_stream.split();
        info!(url = %self.options.url, "connected to gateway");

        #[cfg(feature = "metrics")]
        {
            counter!(gateway_metrics::CONNECTIONS_TOTAL).increment(1);
            gauge!(gateway_metrics::CONNECTED).set(1.0);
        }

        self.on_connected();

        loop {
            tokio::select! {
                msg = ws_reader.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => self.handle_text(text.as_str()),
                        Some(Ok(Message::Close(frame))) => {
                            debug!(?frame, "WebSocket closed by gateway");
                            return Ok(());
                        },
                        None => return Err(Error::connection("stream ended")),
                        Some(Ok(Message::Ping(data))) => {
                            ws_sink.send(Message::Pong(data)).await?;
                        },
                        Some(Ok(_)) => {},
                        Some(Err(e)) => return Err(Error::WebSocket(e)),
                    }
                },
                json = write_rx.recv() => {
                    match json {
                        Some(text) => ws_sink.send(Message::Text(text.into())).await?,
                        None => {
                            let _ = ws_sink.send(Message::Close(None)).await;
                            return Err(Error::ChannelClosed);
                        },
                    }
                },
            }
        }
    }

    /// Start deferred-action recovery next to the receive loop, and tell the
    /// owner what is loaded.
    fn on_connected(&self) {
        let scheduler = Arc::clone(&self.scheduler);
        tokio::spawn(async move {
            match scheduler.recover_on_reconnect().await {
                Ok(count) => debug!(count, "deferred action recovery done"),
                Err(e) => warn!(error = %e, "deferred action recovery failed"),
            }
        });

        let Some(owner) = self.dispatcher.context().owner_id.as_deref() else {
            return;
        };
        let report = self.dispatcher.report();
        let text = format!("botlink connected\n{report}");
        if let Err(e) = self
            .outbound
            .send_command(&send_private_msg(owner, vec![Segment::text(text)]))
        {
            warn!(error = %e, "failed to queue load report");
        }
    }

    /// Decode one text frame and hand it to the dispatcher. Bad frames are
    /// logged and skipped.
    fn handle_text(&self, text: &str) {
        let frame = match Frame::parse(text) {
            Ok(frame) => frame,
            Err(e) => {
                #[cfg(feature = "metrics")]
                counter!(dispatch_metrics::DECODE_ERRORS_TOTAL).increment(1);
                warn!(error = %e, len = text.len(), "skipping undecodable frame");
                return;
            },
        };

        #[cfg(feature = "metrics")]
        counter!(dispatch_metrics::FRAMES_RECEIVED_TOTAL, labels::KIND => frame.kind()).increment(1);

        match &frame {
            Frame::Response(response) => {
                let echo = response.echo.as_deref().unwrap_or_default();
                if self.options.is_quiet(echo) {
                    debug!(status = ?response.status, echo, "response");
                } else {
                    info!(status = ?response.status, echo, retcode = ?response.retcode, "response");
                }
            },
            Frame::Event(event) if event.post_type() == "meta_event" => {
                debug!(meta_event_type = ?event.meta_event_type(), "meta event");
            },
            Frame::Event(event) => {
                info!(
                    post_type = event.post_type(),
                    group_id = ?event.group_id(),
                    user_id = ?event.user_id(),
                    raw_message = ?event.raw_message(),
                    "event"
                );
            },
        }

        self.dispatcher.dispatch(frame);
    }
}
