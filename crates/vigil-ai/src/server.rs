use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{info, warn};
use vigil_core::{RegionId, World};
use vigil_sched::{RegionRemote, RegionWorker, SchedConfig};

use crate::cache::BehaviourCache;
use crate::config::ServerConfig;
use crate::error::{AiError, AiResult};
use crate::motion::start_motion;
use crate::rules::{CombatRules, StandardRules};
use crate::state::{AiRegion, RegionWorld, WorldContext};

/// One server instance: the shared context and every loaded region.
///
/// Regions are driven in lockstep with [`advance_all`](Self::advance_all)
/// or handed to one worker thread each with [`start`](Self::start).
#[derive(Debug)]
pub struct WorldServer {
    context: Arc<WorldContext>,
    scheduler: SchedConfig,
    regions: BTreeMap<RegionId, AiRegion>,
    workers: BTreeMap<RegionId, RegionWorker<RegionWorld>>,
}

impl WorldServer {
    /// A server with no regions yet.
    pub fn new(
        config: ServerConfig,
        behaviours: BehaviourCache,
        rules: impl CombatRules + 'static,
    ) -> AiResult<Self> {
        config.scheduler.validate()?;
        Ok(Self {
            context: Arc::new(WorldContext::new(config.ai, behaviours, rules)),
            scheduler: config.scheduler,
            regions: BTreeMap::new(),
            workers: BTreeMap::new(),
        })
    }

    /// Standard rules and no ambient lines.
    pub fn with_config(config: ServerConfig) -> AiResult<Self> {
        Self::new(config, BehaviourCache::empty(), StandardRules::default())
    }

    /// The shared context.
    pub fn context(&self) -> &Arc<WorldContext> {
        &self.context
    }

    /// Load `world` as a region on the server's scheduler settings.
    pub fn add_region(&mut self, world: World) -> AiResult<RegionId> {
        let scheduler = self.scheduler.clone();
        self.add_region_with(world, scheduler)
    }

    /// Load `world` as a region with its own scheduler settings.
    pub fn add_region_with(&mut self, world: World, scheduler: SchedConfig) -> AiResult<RegionId> {
        if self.is_running() {
            return Err(AiError::ServerRunning);
        }
        let id = world.region();
        if self.regions.contains_key(&id) {
            return Err(AiError::RegionExists(id));
        }
        let state = RegionWorld::new(world, Arc::clone(&self.context));
        let mut region = AiRegion::new(id, state, scheduler)?;
        region.with_scheduler(|_, timers| start_motion(timers))?;
        self.regions.insert(id, region);
        Ok(id)
    }

    /// A loaded region, while the server is not running.
    pub fn region(&self, id: RegionId) -> Option<&AiRegion> {
        self.regions.get(&id)
    }

    /// A loaded region, mutably, while the server is not running.
    pub fn region_mut(&mut self, id: RegionId) -> Option<&mut AiRegion> {
        self.regions.get_mut(&id)
    }

    /// Loaded regions in id order, while the server is not running.
    pub fn regions(&self) -> impl Iterator<Item = &AiRegion> {
        self.regions.values()
    }

    /// Ids of every loaded region.
    pub fn region_ids(&self) -> Vec<RegionId> {
        self.regions.keys().chain(self.workers.keys()).copied().collect()
    }

    /// Advance every region by `ms` of virtual time. Returns the number of
    /// actions fired.
    pub fn advance_all(&mut self, ms: u64) -> usize {
        self.regions.values_mut().map(|region| region.advance_by(ms)).sum()
    }

    /// True while regions run on worker threads.
    pub fn is_running(&self) -> bool {
        !self.workers.is_empty()
    }

    /// Move every region onto its own worker thread.
    pub fn start(&mut self) -> AiResult<()> {
        if self.is_running() {
            return Err(AiError::ServerRunning);
        }
        let regions = std::mem::take(&mut self.regions);
        let count = regions.len();
        for (id, region) in regions {
            let worker = region.spawn()?;
            self.workers.insert(id, worker);
        }
        info!(regions = count, "server_started");
        Ok(())
    }

    /// Handle for posting work to a running region.
    pub fn remote(&self, id: RegionId) -> AiResult<RegionRemote<RegionWorld>> {
        self.workers
            .get(&id)
            .map(RegionWorker::remote)
            .ok_or(AiError::UnknownRegion(id))
    }

    /// Stop every worker and take the regions back. Every worker is asked
    /// to stop even if an earlier one fails; the first failure is returned.
    pub fn stop(&mut self) -> AiResult<()> {
        let workers = std::mem::take(&mut self.workers);
        let mut first_error = None;
        for (id, worker) in workers {
            match worker.stop() {
                Ok(region) => {
                    self.regions.insert(id, region);
                }
                Err(err) => {
                    warn!(region = %id, error = %err, "region_stop_failed");
                    first_error.get_or_insert(AiError::from(err));
                }
            }
        }
        info!(regions = self.regions.len(), "server_stopped");
        first_error.map_or(Ok(()), Err)
    }
}

impl Drop for WorldServer {
    fn drop(&mut self) {
        if self.is_running() {
            let _ = self.stop();
        }
    }
}
