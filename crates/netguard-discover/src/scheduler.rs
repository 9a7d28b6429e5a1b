//! Periodic scans for `--daemon` mode.
//!
//! Every enabled subnet gets its own tokio task and ticker; a shared
//! semaphore caps how many scans run at once across subnets.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::time::{interval, Duration};

use netguard_core::{OrgId, ScanType};

use crate::config::{DiscoverConfig, ScanProfile, SubnetSchedule};
use crate::error::Result;
use crate::pipeline::{ScanPipeline, ScanRequest};

pub struct ScanScheduler {
    config: DiscoverConfig,
    pipeline: Arc<ScanPipeline>,
    org: OrgId,
    concurrency: Arc<Semaphore>,
}

impl ScanScheduler {
    pub fn new(config: DiscoverConfig, pipeline: Arc<ScanPipeline>, org: OrgId) -> Self {
        let concurrency = Arc::new(Semaphore::new(config.max_concurrent_scans.max(1)));
        Self {
            config,
            pipeline,
            org,
            concurrency,
        }
    }

    /// Run the scheduler, spawning a tokio task per enabled subnet.
    /// Blocks until every task ends or the runtime shuts down.
    pub async fn run(&self) -> Result<()> {
        let mut handles = Vec::new();

        for subnet in &self.config.subnets {
            if !subnet.enabled {
                tracing::info!(cidr = %subnet.cidr, "Skipping disabled subnet");
                continue;
            }

            let pipeline = self.pipeline.clone();
            let org = self.org;
            let request = scheduled_request(subnet, self.config.default_profile);
            let period = Duration::from_secs(subnet.interval_secs.max(1));
            let semaphore = self.concurrency.clone();

            let handle = tokio::spawn(async move {
                run_subnet_loop(pipeline, org, request, period, semaphore).await;
            });
            handles.push(handle);
        }

        tracing::info!(org = %self.org, subnet_count = handles.len(), "Scheduler started");

        for handle in handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Subnet loop aborted");
            }
        }

        Ok(())
    }
}

/// Scheduled scans are security scans unless the subnet overrides it.
pub fn scheduled_request(subnet: &SubnetSchedule, default_profile: ScanProfile) -> ScanRequest {
    ScanRequest::new(
        &subnet.cidr,
        subnet.scan_type.unwrap_or(ScanType::Security),
        subnet.profile.unwrap_or(default_profile),
    )
}

async fn run_subnet_loop(
    pipeline: Arc<ScanPipeline>,
    org: OrgId,
    request: ScanRequest,
    period: Duration,
    semaphore: Arc<Semaphore>,
) {
    let mut ticker = interval(period);

    loop {
        ticker.tick().await;

        tracing::info!(
            cidr = %request.target,
            profile = %request.profile,
            scan_type = %request.scan_type,
            "Scheduled scan triggered"
        );

        let Ok(_permit) = semaphore.acquire().await else {
            tracing::error!(cidr = %request.target, "Scan semaphore closed, stopping subnet loop");
            return;
        };

        if let Err(e) = pipeline.run(&org, &request).await {
            tracing::error!(cidr = %request.target, error = %e, "Scheduled scan failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subnet(cidr: &str) -> SubnetSchedule {
        SubnetSchedule {
            cidr: cidr.to_string(),
            name: None,
            profile: None,
            scan_type: None,
            interval_secs: 60,
            enabled: true,
        }
    }

    #[test]
    fn scheduled_scans_default_to_security() {
        let request = scheduled_request(&subnet("10.0.1.0/24"), ScanProfile::Standard);
        assert_eq!(request.scan_type, ScanType::Security);
        assert_eq!(request.profile, ScanProfile::Standard);
        assert_eq!(request.target, "10.0.1.0/24");
    }

    #[test]
    fn subnet_overrides_apply() {
        let mut s = subnet("10.0.2.0/24");
        s.scan_type = Some(ScanType::Network);
        s.profile = Some(ScanProfile::Quick);
        let request = scheduled_request(&s, ScanProfile::Deep);
        assert_eq!(request.scan_type, ScanType::Network);
        assert_eq!(request.profile, ScanProfile::Quick);
    }
}
