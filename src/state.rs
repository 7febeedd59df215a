use anyhow::Context;
use std::sync::Arc;

use crate::cli::{CommandArgs, SupervisorKind};
use crate::services::{
    GroupService, LocalSupervisor, MonitorContext, Pm2Supervisor, SessionManager, Supervisor,
};
use crate::store::{ConfigStore, FallbackStore};

pub struct AppStateInner {
    pub supervisor: Arc<dyn Supervisor>,
    pub config_store: ConfigStore,
    pub groups: GroupService,
    pub sessions: Arc<SessionManager>,
}

impl AppStateInner {
    pub fn context(&self) -> &MonitorContext {
        self.sessions.context()
    }
}

pub type AppState = Arc<AppStateInner>;

pub fn new_state(args: &CommandArgs) -> anyhow::Result<AppState> {
    let supervisor: Arc<dyn Supervisor> = match args.supervisor {
        SupervisorKind::Pm2 => Arc::new(Pm2Supervisor::new(args.pm2_bin.clone())),
        SupervisorKind::Local => Arc::new(
            LocalSupervisor::from_file(&args.processes_file)
                .context("failed to load local process list")?,
        ),
    };

    let fallback_store = FallbackStore::new(args.fallback_file.clone());
    log::info!("✓ Fallback store at {}", fallback_store.path().display());

    let ctx = MonitorContext {
        supervisor,
        config_store: ConfigStore::open(&args.database),
        fallback_store,
        poll_interval: args.poll_interval(),
        tail_lines: args.tail_lines as usize,
    };
    Ok(state_from_context(ctx))
}

pub fn state_from_context(ctx: MonitorContext) -> AppState {
    Arc::new(AppStateInner {
        supervisor: ctx.supervisor.clone(),
        config_store: ctx.config_store.clone(),
        groups: GroupService::new(ctx.config_store.clone(), ctx.fallback_store.clone()),
        sessions: Arc::new(SessionManager::new(ctx)),
    })
}
