// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use tokio_util::sync::CancellationToken;

use crate::bus::NotificationBus;
use crate::config::DispatchConfig;
use crate::engine::AssignmentEngine;

/// Shared server state handed to every handler.
pub struct AppState {
    pub engine: AssignmentEngine,
    pub bus: NotificationBus,
    pub config: DispatchConfig,
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(
        engine: AssignmentEngine,
        bus: NotificationBus,
        config: DispatchConfig,
        shutdown: CancellationToken,
    ) -> Self {
        Self { engine, bus, config, shutdown }
    }
}
