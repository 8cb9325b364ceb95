//! Observer TCP server
//!
//! One task per client. Each task forwards hub frames to its socket and
//! answers the client's requests in arrival order.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use gcs_shared::codec::{self, CodecError, FrameDecoder};
use gcs_shared::{ClientFrame, ObserverEvent, ServerFrame, Severity};
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use super::hub::ObserverHub;
use super::router::RequestRouter;
use crate::telemetry::TelemetryStore;

pub struct ObserverServer {
    listener: TcpListener,
    router: Arc<RequestRouter>,
    store: Arc<TelemetryStore>,
    hub: ObserverHub,
}

impl ObserverServer {
    pub async fn bind(
        addr: SocketAddr,
        router: Arc<RequestRouter>,
        store: Arc<TelemetryStore>,
        hub: ObserverHub,
    ) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("binding observer listener on {}", addr))?;
        Ok(Self {
            listener,
            router,
            store,
            hub,
        })
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept clients until the listener fails
    pub async fn run(self) -> anyhow::Result<()> {
        info!("[OBSERVER] Listening on {}", self.local_addr()?);
        loop {
            let (socket, addr) = self.listener.accept().await.context("accepting observer")?;
            info!("[OBSERVER] Client connected: {}", addr);

            let client = ObserverClient {
                addr,
                router: self.router.clone(),
                store: self.store.clone(),
                hub: self.hub.clone(),
            };
            tokio::spawn(async move {
                match client.serve(socket).await {
                    Ok(()) => info!("[OBSERVER] Client disconnected: {}", addr),
                    Err(e) => warn!("[OBSERVER] Client {} dropped: {:#}", addr, e),
                }
            });
        }
    }
}

struct ObserverClient {
    addr: SocketAddr,
    router: Arc<RequestRouter>,
    store: Arc<TelemetryStore>,
    hub: ObserverHub,
}

impl ObserverClient {
    async fn serve(self, mut socket: TcpStream) -> anyhow::Result<()> {
        // Subscribe first so nothing published after the snapshot is missed
        let mut frames = self.hub.subscribe();
        let (mut reader, mut writer) = socket.split();

        write_frame(&mut writer, &ServerFrame::Snapshot(self.store.snapshot().await)).await?;
        write_frame(
            &mut writer,
            &ServerFrame::Event(ObserverEvent::status_message(
                "Connected to bridge",
                Severity::Info,
            )),
        )
        .await?;

        let mut decoder = FrameDecoder::new();
        let mut buf = vec![0u8; 4096];

        loop {
            tokio::select! {
                read = reader.read(&mut buf) => {
                    let n = read.context("reading from observer")?;
                    if n == 0 {
                        return Ok(());
                    }
                    decoder.extend(&buf[..n]);

                    loop {
                        match decoder.decode_next::<ClientFrame>() {
                            Ok(Some(frame)) => {
                                debug!("[OBSERVER] {} request #{}", self.addr, frame.id);
                                let reply = self.router.handle(frame.request).await;
                                let reply = ServerFrame::Reply {
                                    id: frame.id,
                                    success: reply.ok,
                                    message: reply.message,
                                };
                                write_frame(&mut writer, &reply).await?;
                            }
                            Ok(None) => break,
                            // The malformed frame has been consumed; keep going
                            Err(CodecError::Json(e)) => {
                                warn!("[OBSERVER] Malformed request from {}: {}", self.addr, e);
                            }
                            Err(e) => return Err(e.into()),
                        }
                    }
                }
                frame = frames.recv() => match frame {
                    Ok(frame) => write_frame(&mut writer, &frame).await?,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("[OBSERVER] {} lagging, skipped {} frames", self.addr, skipped);
                    }
                    Err(RecvError::Closed) => return Ok(()),
                },
            }
        }
    }
}

async fn write_frame<W>(writer: &mut W, frame: &ServerFrame) -> anyhow::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let bytes = codec::encode(frame)?;
    writer
        .write_all(&bytes)
        .await
        .context("writing to observer")?;
    Ok(())
}
