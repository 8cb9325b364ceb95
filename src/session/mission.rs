//! Mission and geofence download
//!
//! The vehicle hands out its item lists one element at a time:
//! REQUEST_LIST -> COUNT -> (REQUEST_INT -> ITEM_INT) * n -> ACK. The
//! downloader tracks one such exchange and tells the supervisor what to send
//! and what to report; it never touches the link itself.

use std::time::Duration;

use gcs_shared::{CommandStatus, FencePoint, ObserverEvent, Waypoint};
use mavlink::ardupilotmega::MavMessage;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::link::encode;
use crate::link::{MissionKind, TargetIds};

/// Effect of a download step
#[derive(Debug, Clone, PartialEq)]
pub enum MissionOutput {
    Send(MavMessage),
    Notify(ObserverEvent),
}

#[derive(Debug)]
struct Download {
    kind: MissionKind,
    target: TargetIds,
    expected: Option<u16>,
    items: Vec<Waypoint>,
    deadline: Instant,
}

#[derive(Debug)]
pub struct MissionDownloader {
    active: Option<Download>,
    item_timeout: Duration,
}

impl MissionDownloader {
    pub fn new(item_timeout: Duration) -> Self {
        Self {
            active: None,
            item_timeout,
        }
    }

    #[cfg(test)]
    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn is_active_for(&self, kind: MissionKind) -> bool {
        self.active.as_ref().is_some_and(|d| d.kind == kind)
    }

    /// Begin a download; only one may run at a time
    pub fn start(&mut self, kind: MissionKind, target: TargetIds) -> Result<Vec<MissionOutput>, String> {
        if let Some(active) = &self.active {
            return Err(format!(
                "{} already in progress",
                active.kind.request_label()
            ));
        }
        info!("[SESSION] {} started", kind.request_label());
        self.active = Some(Download {
            kind,
            target,
            expected: None,
            items: Vec::new(),
            deadline: Instant::now() + self.item_timeout,
        });
        Ok(vec![MissionOutput::Send(encode::mission_request_list(target, kind))])
    }

    pub fn on_count(&mut self, kind: MissionKind, count: u16) -> Vec<MissionOutput> {
        let Some(download) = self.active.as_mut().filter(|d| d.kind == kind) else {
            return Vec::new();
        };
        if download.expected.is_some() {
            return Vec::new();
        }
        debug!("[SESSION] {} reports {} items", kind.request_label(), count);
        if count == 0 {
            return self.finish();
        }
        download.expected = Some(count);
        download.items.reserve(count as usize);
        download.deadline = Instant::now() + self.item_timeout;
        vec![MissionOutput::Send(encode::mission_request_int(
            download.target,
            kind,
            0,
        ))]
    }

    pub fn on_item(&mut self, kind: MissionKind, item: Waypoint) -> Vec<MissionOutput> {
        let Some(download) = self.active.as_mut().filter(|d| d.kind == kind) else {
            return Vec::new();
        };
        let Some(expected) = download.expected else {
            return Vec::new();
        };
        // Duplicates and out-of-order items are left to the item timeout
        if item.seq as usize != download.items.len() {
            debug!(
                "[SESSION] Ignoring item {} while waiting for {}",
                item.seq,
                download.items.len()
            );
            return Vec::new();
        }

        download.items.push(item);
        let next = download.items.len() as u16;
        if next >= expected {
            return self.finish();
        }
        download.deadline = Instant::now() + self.item_timeout;
        vec![MissionOutput::Send(encode::mission_request_int(
            download.target,
            kind,
            next,
        ))]
    }

    /// The vehicle refused or aborted the exchange
    pub fn on_refused(&mut self, kind: MissionKind, code: u8) -> Vec<MissionOutput> {
        if !self.is_active_for(kind) {
            return Vec::new();
        }
        self.fail(
            CommandStatus::Failed,
            format!("Vehicle aborted the download (code {})", code),
        )
    }

    pub fn check_timeout(&mut self, now: Instant) -> Vec<MissionOutput> {
        match &self.active {
            Some(download) if now >= download.deadline => {
                let step = match download.expected {
                    None => "item count".to_string(),
                    Some(_) => format!("item {}", download.items.len()),
                };
                self.fail(
                    CommandStatus::Timeout,
                    format!("Timed out waiting for {}", step),
                )
            }
            _ => Vec::new(),
        }
    }

    /// Drop an active download because its link went away
    pub fn abort(&mut self, reason: &str) -> Vec<MissionOutput> {
        if self.active.is_none() {
            return Vec::new();
        }
        self.fail(CommandStatus::ConnectionLost, reason.to_string())
    }

    fn fail(&mut self, status: CommandStatus, message: String) -> Vec<MissionOutput> {
        let Some(download) = self.active.take() else {
            return Vec::new();
        };
        warn!("[SESSION] {} failed: {}", download.kind.request_label(), message);
        vec![MissionOutput::Notify(ObserverEvent::command_result(
            download.kind.request_label(),
            status,
            message,
        ))]
    }

    fn finish(&mut self) -> Vec<MissionOutput> {
        let Some(download) = self.active.take() else {
            return Vec::new();
        };
        let label = download.kind.request_label();
        let count = download.items.len();
        info!("[SESSION] {} complete, {} items", label, count);

        let update = match download.kind {
            MissionKind::Mission => ObserverEvent::MissionUpdate {
                waypoints: download.items,
            },
            MissionKind::Fence => ObserverEvent::GeofenceUpdate {
                points: download
                    .items
                    .into_iter()
                    .map(|item| FencePoint {
                        seq: item.seq,
                        command: item.command,
                        lat: item.lat,
                        lon: item.lon,
                        param1: item.params[0],
                    })
                    .collect(),
            },
        };
        vec![
            MissionOutput::Send(encode::mission_ack(download.target, download.kind)),
            MissionOutput::Notify(update),
            MissionOutput::Notify(ObserverEvent::command_result(
                label,
                CommandStatus::Accepted,
                format!("Downloaded {} items", count),
            )),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target() -> TargetIds {
        TargetIds::new(1, 1)
    }

    fn waypoint(seq: u16) -> Waypoint {
        Waypoint {
            seq,
            command: 16,
            frame: 3,
            lat: 47.0 + seq as f64 * 0.001,
            lon: 8.0,
            alt: 20.0,
            params: [0.0; 4],
        }
    }

    fn requested_seq(output: &[MissionOutput]) -> Option<u16> {
        match output {
            [MissionOutput::Send(MavMessage::MISSION_REQUEST_INT(req))] => Some(req.seq),
            _ => None,
        }
    }

    #[tokio::test]
    async fn test_full_mission_download() {
        let mut downloader = MissionDownloader::new(Duration::from_secs(5));
        let out = downloader.start(MissionKind::Mission, target()).unwrap();
        assert!(matches!(
            out.as_slice(),
            [MissionOutput::Send(MavMessage::MISSION_REQUEST_LIST(_))]
        ));

        assert_eq!(requested_seq(&downloader.on_count(MissionKind::Mission, 2)), Some(0));
        assert_eq!(requested_seq(&downloader.on_item(MissionKind::Mission, waypoint(0))), Some(1));

        let out = downloader.on_item(MissionKind::Mission, waypoint(1));
        assert!(!downloader.is_active());
        assert!(matches!(out[0], MissionOutput::Send(MavMessage::MISSION_ACK(_))));
        match &out[1] {
            MissionOutput::Notify(ObserverEvent::MissionUpdate { waypoints }) => {
                assert_eq!(waypoints.len(), 2);
                assert_eq!(waypoints[1].seq, 1);
            }
            other => panic!("unexpected output {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_fence() {
        let mut downloader = MissionDownloader::new(Duration::from_secs(5));
        downloader.start(MissionKind::Fence, target()).unwrap();
        let out = downloader.on_count(MissionKind::Fence, 0);
        assert_eq!(
            out[1],
            MissionOutput::Notify(ObserverEvent::GeofenceUpdate { points: Vec::new() })
        );
    }

    #[tokio::test]
    async fn test_second_download_rejected() {
        let mut downloader = MissionDownloader::new(Duration::from_secs(5));
        downloader.start(MissionKind::Mission, target()).unwrap();
        assert!(downloader.start(MissionKind::Fence, target()).is_err());
        assert!(downloader.is_active_for(MissionKind::Mission));
    }

    #[tokio::test]
    async fn test_out_of_order_item_ignored() {
        let mut downloader = MissionDownloader::new(Duration::from_secs(5));
        downloader.start(MissionKind::Mission, target()).unwrap();
        downloader.on_count(MissionKind::Mission, 3);
        assert!(downloader.on_item(MissionKind::Mission, waypoint(2)).is_empty());
        // Other list kinds do not interfere
        assert!(downloader.on_item(MissionKind::Fence, waypoint(0)).is_empty());
        assert!(downloader.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_item_timeout() {
        let mut downloader = MissionDownloader::new(Duration::from_secs(5));
        downloader.start(MissionKind::Mission, target()).unwrap();
        assert!(downloader.check_timeout(Instant::now()).is_empty());

        tokio::time::advance(Duration::from_secs(6)).await;
        let out = downloader.check_timeout(Instant::now());
        assert!(!downloader.is_active());
        assert!(matches!(
            &out[0],
            MissionOutput::Notify(ObserverEvent::CommandResult {
                status: CommandStatus::Timeout,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_abort_reports_connection_lost() {
        let mut downloader = MissionDownloader::new(Duration::from_secs(5));
        assert!(downloader.abort("link closed").is_empty());

        downloader.start(MissionKind::Fence, target()).unwrap();
        let out = downloader.abort("link closed");
        assert!(matches!(
            &out[0],
            MissionOutput::Notify(ObserverEvent::CommandResult {
                status: CommandStatus::ConnectionLost,
                ..
            })
        ));
    }
}
