//! Endpoint contract of the update and factory reset API.
//!
//! The web server hands every body chunk of an upload to one of the upload
//! methods below and sends the reply it gets back, if any. Exactly one reply
//! is produced per upload: on the chunk that failed, or on the final chunk.
//! No server is bundled; this is the part of the controller that decides
//! status codes and bodies.

use std::sync::Arc;

use serde_json::Value;
use tracing::{info, warn};

use crate::config::ControllerConfig;
use crate::events::UpdateObserver;
use crate::platform::{FlashWriter, System};
use crate::reset::FactoryReset;
use crate::scheduler::TaskScheduler;
use crate::update::{ChunkOutcome, FirmwareUpdater, UpdateError, UpdateGate, UpdateTarget};

pub const CHECK_FIRMWARE: &str = "/check_firmware";
pub const FLASH_FIRMWARE: &str = "/flash_firmware";
pub const FLASH_FILESYSTEM: &str = "/flash_spiffs";
pub const FACTORY_RESET: &str = "/factory_reset";

/// Body key a factory reset request must set to `true`.
pub const FACTORY_RESET_CONFIRMATION: &str = "do_i_know_what_i_am_doing";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    pub status: u16,
    pub content_type: &'static str,
    pub body: String,
}

impl HttpReply {
    pub fn text(status: u16, body: &str) -> Self {
        Self {
            status,
            content_type: "text/plain",
            body: body.to_string(),
        }
    }

    pub fn html(status: u16, body: &str) -> Self {
        Self {
            status,
            content_type: "text/html",
            body: body.to_string(),
        }
    }

    pub fn json(status: u16, body: &Value) -> Self {
        Self {
            status,
            content_type: "application/json",
            body: body.to_string(),
        }
    }

    pub fn empty(status: u16) -> Self {
        Self::text(status, "")
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// One body chunk of an upload.
#[derive(Debug, Clone, Copy)]
pub struct UploadChunk<'a> {
    /// Offset of `data` in the upload.
    pub index: usize,
    pub data: &'a [u8],
    pub is_final: bool,
    /// Content length announced by the request.
    pub total_len: usize,
}

/// Board state tasks run against.
#[derive(Debug)]
pub struct Board<S: System> {
    pub system: S,
    pub factory_reset: FactoryReset,
}

/// Update, restart and factory reset handling of one controller.
pub struct Controller<F: FlashWriter, S: System> {
    updater: FirmwareUpdater<F>,
    board: Board<S>,
    scheduler: TaskScheduler<Board<S>>,
    restart_delay_ms: u64,
    factory_reset_delay_ms: u64,
    now_ms: u64,
    check_replied: bool,
    flash_replied: bool,
}

impl<F: FlashWriter + 'static, S: System + 'static> Controller<F, S> {
    pub fn new(
        config: &ControllerConfig,
        flash: F,
        system: S,
        gate: UpdateGate,
        observer: Arc<dyn UpdateObserver>,
    ) -> Self {
        Self {
            updater: FirmwareUpdater::new(flash, config.update_policy(), gate, observer),
            board: Board {
                system,
                factory_reset: FactoryReset::new(),
            },
            scheduler: TaskScheduler::new(),
            restart_delay_ms: config.restart_delay_ms,
            factory_reset_delay_ms: config.factory_reset_delay_ms,
            now_ms: 0,
            check_replied: false,
            flash_replied: false,
        }
    }

    pub fn updater(&self) -> &FirmwareUpdater<F> {
        &self.updater
    }

    pub fn system(&self) -> &S {
        &self.board.system
    }

    pub fn factory_reset(&self) -> &FactoryReset {
        &self.board.factory_reset
    }

    pub fn scheduler(&self) -> &TaskScheduler<Board<S>> {
        &self.scheduler
    }

    /// `POST /check_firmware`: validate an info region without flashing.
    pub fn check_firmware(
        &mut self,
        chunk: UploadChunk<'_>,
        detect_downgrade: bool,
    ) -> Option<HttpReply> {
        if chunk.index == 0 {
            self.check_replied = false;
        }
        let result = self
            .updater
            .check_chunk(chunk.index, chunk.data, chunk.is_final, detect_downgrade);

        let reply = match result {
            Ok(ChunkOutcome::Complete) => HttpReply::empty(200),
            Ok(_) => return None,
            Err(e) => HttpReply::json(400, &e.to_json()),
        };
        Self::reply_once(&mut self.check_replied, reply)
    }

    /// `POST /flash_firmware`: validate and flash a merged firmware image.
    pub fn flash_firmware(&mut self, chunk: UploadChunk<'_>) -> Option<HttpReply> {
        self.flash(UpdateTarget::Firmware, chunk)
    }

    /// `POST /flash_spiffs`: flash a filesystem image.
    pub fn flash_filesystem(&mut self, chunk: UploadChunk<'_>) -> Option<HttpReply> {
        self.flash(UpdateTarget::Filesystem, chunk)
    }

    fn flash(&mut self, target: UpdateTarget, chunk: UploadChunk<'_>) -> Option<HttpReply> {
        if chunk.index == 0 {
            self.flash_replied = false;
        }
        let result = self.updater.flash_chunk(
            target,
            chunk.index,
            chunk.data,
            chunk.is_final,
            chunk.total_len,
        );

        let reply = match result {
            Ok(ChunkOutcome::Complete) => {
                let task = match target {
                    UpdateTarget::Firmware => "flash_firmware_reboot",
                    UpdateTarget::Filesystem => "flash_filesystem_reboot",
                };
                self.scheduler.schedule_once(
                    task,
                    self.restart_delay_ms,
                    self.now_ms,
                    |board: &mut Board<S>| board.system.restart(),
                );
                HttpReply::text(200, "Update OK")
            }
            Ok(_) => return None,
            Err(UpdateError::UpdatesLocked) => HttpReply::text(423, "vehicle connected"),
            Err(e) => HttpReply::json(e.status(), &e.to_json()),
        };
        Self::reply_once(&mut self.flash_replied, reply)
    }

    fn reply_once(replied: &mut bool, reply: HttpReply) -> Option<HttpReply> {
        if *replied {
            return None;
        }
        *replied = true;
        Some(reply)
    }

    /// `PUT /factory_reset` with `{"do_i_know_what_i_am_doing": true}`.
    pub fn factory_reset_request(&mut self, body: &str) -> HttpReply {
        let doc: Value = match serde_json::from_str(body) {
            Ok(doc) => doc,
            Err(e) => {
                warn!("Failed to parse command payload: {}", e);
                return HttpReply::empty(400);
            }
        };

        match doc.get(FACTORY_RESET_CONFIRMATION).and_then(Value::as_bool) {
            None => HttpReply::html(400, "you don't seem to know what you are doing"),
            Some(false) => HttpReply::html(400, "Factory reset NOT initiated"),
            Some(true) => {
                self.scheduler.schedule_once(
                    "factory_reset",
                    self.factory_reset_delay_ms,
                    self.now_ms,
                    |board: &mut Board<S>| {
                        info!("Factory reset requested");
                        board.factory_reset.run(&mut board.system);
                    },
                );
                HttpReply::html(200, "Factory reset initiated")
            }
        }
    }

    /// One control loop iteration. Returns the names of the tasks that ran.
    pub fn tick(&mut self, now_ms: u64) -> Vec<&'static str> {
        self.now_ms = now_ms;
        let mut ran = self.scheduler.tick(now_ms, &mut self.board);
        if self
            .board
            .factory_reset
            .poll(&mut self.board.system)
            .is_some()
        {
            ran.push("factory_reset");
        }
        ran
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::NullObserver;
    use crate::platform::{MemoryFlash, SimulatedSystem};
    use crate::update::Version;
    use crate::update::layout::INFO_REGION;
    use crate::update::pipeline::tests::test_image;

    fn controller() -> (Controller<MemoryFlash, SimulatedSystem>, MemoryFlash, SimulatedSystem) {
        let flash = MemoryFlash::new(1 << 20);
        let system = SimulatedSystem::new(true);
        let controller = Controller::new(
            &ControllerConfig::default(),
            flash.clone(),
            system.clone(),
            UpdateGate::default(),
            Arc::new(NullObserver),
        );
        (controller, flash, system)
    }

    fn upload<'a>(
        image: &'a [u8],
        size: usize,
    ) -> impl Iterator<Item = UploadChunk<'a>> + 'a {
        let count = image.len().div_ceil(size);
        image.chunks(size).enumerate().map(move |(i, data)| UploadChunk {
            index: i * size,
            data,
            is_final: i + 1 == count,
            total_len: image.len(),
        })
    }

    #[test]
    fn test_flash_replies_once_and_restarts_later() {
        let image = test_image("WARP Charger", Version::new(2, 1, 0));
        let (mut controller, flash, system) = controller();
        controller.tick(10_000);

        let replies: Vec<HttpReply> = upload(&image, 0x4000)
            .filter_map(|chunk| controller.flash_firmware(chunk))
            .collect();
        assert_eq!(replies, vec![HttpReply::text(200, "Update OK")]);
        assert!(flash.committed(UpdateTarget::Firmware).is_some());

        assert!(controller.scheduler().is_scheduled("flash_firmware_reboot"));
        assert!(controller.tick(10_999).is_empty());
        assert_eq!(system.restart_count(), 0);
        assert_eq!(controller.tick(11_000), vec!["flash_firmware_reboot"]);
        assert_eq!(system.restart_count(), 1);
    }

    #[test]
    fn test_flash_error_body() {
        let image = test_image("WARP2 Energy Manager", Version::new(2, 1, 0));
        let (mut controller, _, _) = controller();

        let replies: Vec<HttpReply> = upload(&image, 0x4000)
            .filter_map(|chunk| controller.flash_firmware(chunk))
            .collect();
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].status, 400);
        assert_eq!(
            replies[0].body,
            r#"{"error":"firmware_update.script.wrong_firmware_type"}"#
        );
        assert!(controller.scheduler().is_empty());
    }

    #[test]
    fn test_gate_closed_statuses() {
        let image = test_image("WARP Charger", Version::new(2, 1, 0));
        let (mut controller, _, _) = controller();
        controller.updater().gate().set_permitted(false);

        let replies: Vec<HttpReply> = upload(&image, 0x8000)
            .filter_map(|chunk| controller.flash_firmware(chunk))
            .collect();
        assert_eq!(replies, vec![HttpReply::text(423, "vehicle connected")]);

        let region = &image[INFO_REGION.start..INFO_REGION.end()];
        let reply = controller.check_firmware(
            UploadChunk {
                index: 0,
                data: region,
                is_final: true,
                total_len: region.len(),
            },
            true,
        );
        let reply = reply.unwrap();
        assert_eq!(reply.status, 400);
        assert_eq!(
            reply.body,
            r#"{"error":"firmware_update.script.vehicle_connected"}"#
        );
    }

    #[test]
    fn test_check_downgrade_reply() {
        let image = test_image("WARP Charger", Version::new(2, 0, 9));
        let region = &image[INFO_REGION.start..INFO_REGION.end()];
        let (mut controller, flash, _) = controller();

        let replies: Vec<HttpReply> = upload(region, 1000)
            .filter_map(|chunk| controller.check_firmware(chunk, true))
            .collect();
        assert_eq!(replies.len(), 1);
        let body: Value = serde_json::from_str(&replies[0].body).unwrap();
        assert_eq!(body["error"], "firmware_update.script.downgrade");
        assert_eq!(body["fw"], "2.0.9");
        assert_eq!(body["installed"], "2.1.0");

        let replies: Vec<HttpReply> = upload(region, 1000)
            .filter_map(|chunk| controller.check_firmware(chunk, false))
            .collect();
        assert_eq!(replies, vec![HttpReply::empty(200)]);
        assert!(flash.write_sizes().is_empty());
    }

    #[test]
    fn test_filesystem_reboot_task() {
        let image = vec![0x42u8; 5000];
        let (mut controller, flash, _) = controller();

        let replies: Vec<HttpReply> = upload(&image, 4096)
            .filter_map(|chunk| controller.flash_filesystem(chunk))
            .collect();
        assert_eq!(replies, vec![HttpReply::text(200, "Update OK")]);
        assert_eq!(flash.committed(UpdateTarget::Filesystem), Some(image));
        assert!(controller.scheduler().is_scheduled("flash_filesystem_reboot"));
    }

    #[test]
    fn test_factory_reset_refusals() {
        let (mut controller, _, system) = controller();

        assert_eq!(controller.factory_reset_request("{").status, 400);
        assert_eq!(
            controller.factory_reset_request("{}"),
            HttpReply::html(400, "you don't seem to know what you are doing")
        );
        assert_eq!(
            controller.factory_reset_request(r#"{"do_i_know_what_i_am_doing": "yes"}"#),
            HttpReply::html(400, "you don't seem to know what you are doing")
        );
        assert_eq!(
            controller.factory_reset_request(r#"{"do_i_know_what_i_am_doing": false}"#),
            HttpReply::html(400, "Factory reset NOT initiated")
        );
        assert!(controller.scheduler().is_empty());
        controller.tick(100_000);
        assert_eq!(system.format_count(), 0);
    }

    #[test]
    fn test_factory_reset_after_delay() {
        let (mut controller, _, system) = controller();
        controller.tick(500);

        assert_eq!(
            controller.factory_reset_request(r#"{"do_i_know_what_i_am_doing": true}"#),
            HttpReply::html(200, "Factory reset initiated")
        );
        assert!(controller.tick(3499).is_empty());
        assert_eq!(controller.tick(3500), vec!["factory_reset"]);
        assert_eq!(system.format_count(), 1);
        assert_eq!(system.restart_count(), 1);

        // A second request while the first is still running is a no-op.
        controller.factory_reset_request(r#"{"do_i_know_what_i_am_doing": true}"#);
        controller.tick(10_000);
        assert_eq!(system.format_count(), 1);
    }

    #[test]
    fn test_requested_reset_runs_on_tick() {
        let (mut controller, _, system) = controller();
        controller.factory_reset().request();
        assert_eq!(controller.tick(1), vec!["factory_reset"]);
        assert_eq!(system.format_count(), 1);
    }
}
