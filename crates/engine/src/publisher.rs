// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Publisher routing: one plugin per target platform, bounded retries,
//! per-target outcomes.

use crate::runtime::{Engine, EngineError};
use cf_core::{Clock, Event, JobId, KernelError};
use cf_plugin::contracts::PublishRequest;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

impl<C: Clock + 'static> Engine<C> {
    /// Publish the stitched artifact to every target of a job. A target
    /// failure is recorded per target; the job only fails if all targets
    /// fail (decided by the caller).
    pub(crate) async fn run_publishing(
        &self,
        job_id: JobId,
        token: &CancellationToken,
    ) -> Result<(), EngineError> {
        let job = {
            let state = self.state.lock();
            match state.jobs.get(job_id.as_str()) {
                Some(job) => job.clone(),
                None => return Ok(()),
            }
        };
        let artifact_url = match &job.output_key {
            Some(key) => format!("fs://media/{key}"),
            None => return Ok(()),
        };

        for target in &job.publish_targets {
            if token.is_cancelled() {
                return Ok(());
            }
            // Resume support: targets that already settled stay settled
            let settled = job
                .publish_outcomes
                .iter()
                .any(|o| o.platform == target.platform && !matches!(o.status, cf_core::PublishStatus::Pending));
            if settled {
                continue;
            }
            let mut attempts = 0u32;
            loop {
                let outcome = match self.host.publisher_for(&target.platform) {
                    Ok(publisher) => {
                        attempts += 1;
                        publisher
                            .publish(PublishRequest {
                                platform: target.platform.clone(),
                                title: target.title.clone(),
                                description: target.description.clone(),
                                privacy: target.privacy.clone(),
                                artifact_url: artifact_url.clone(),
                                credentials_ref: target.credentials_ref.clone(),
                            })
                            .await
                    }
                    Err(e) => {
                        // No plugin for the platform: not worth retrying
                        attempts += 1;
                        let error = EngineError::from(e).to_kernel(self.clock.epoch_ms());
                        self.record_publish_failed(job_id, &target.platform, error, attempts)?;
                        break;
                    }
                };

                match outcome {
                    Ok(receipt) => {
                        info!(job = %job_id, platform = %target.platform, url = %receipt.url, "published");
                        self.record(vec![Event::PublishSucceeded {
                            job_id,
                            platform: target.platform.clone(),
                            platform_id: receipt.platform_id,
                            url: receipt.url,
                            attempts,
                        }])?;
                        break;
                    }
                    Err(e) if self.config.publish_backoff.exhausted(attempts) => {
                        let error = EngineError::from(e).to_kernel(self.clock.epoch_ms());
                        self.record_publish_failed(job_id, &target.platform, error, attempts)?;
                        break;
                    }
                    Err(e) => {
                        let delay = self.config.publish_backoff.delay(attempts);
                        warn!(
                            job = %job_id,
                            platform = %target.platform,
                            attempt = attempts,
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            "publish attempt failed, backing off",
                        );
                        tokio::select! {
                            _ = tokio::time::sleep(delay) => {}
                            _ = token.cancelled() => return Ok(()),
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Ad-hoc publish of a completed job's artifact to one more target.
    pub async fn publish_single(
        &self,
        id: &str,
        target: cf_core::PublishTarget,
    ) -> Result<(String, String), EngineError> {
        let (job_id, artifact_url) = {
            let state = self.state.lock();
            let job = state
                .get_job(id)
                .ok_or_else(|| EngineError::JobNotFound(id.to_string()))?;
            let key = job
                .output_key
                .as_ref()
                .ok_or_else(|| EngineError::JobNotFound(format!("{id} has no artifact")))?;
            (job.id, format!("fs://media/{key}"))
        };

        let mut attempts = 0u32;
        loop {
            attempts += 1;
            let result = match self.host.publisher_for(&target.platform) {
                Ok(publisher) => {
                    publisher
                        .publish(PublishRequest {
                            platform: target.platform.clone(),
                            title: target.title.clone(),
                            description: target.description.clone(),
                            privacy: target.privacy.clone(),
                            artifact_url: artifact_url.clone(),
                            credentials_ref: target.credentials_ref.clone(),
                        })
                        .await
                }
                Err(e) => {
                    let err = EngineError::from(e);
                    let error = err.to_kernel(self.clock.epoch_ms());
                    self.record_publish_failed(job_id, &target.platform, error, attempts)?;
                    return Err(err);
                }
            };
            match result {
                Ok(receipt) => {
                    self.record(vec![Event::PublishSucceeded {
                        job_id,
                        platform: target.platform.clone(),
                        platform_id: receipt.platform_id.clone(),
                        url: receipt.url.clone(),
                        attempts,
                    }])?;
                    return Ok((receipt.platform_id, receipt.url));
                }
                Err(e) if self.config.publish_backoff.exhausted(attempts) => {
                    let err = EngineError::from(e);
                    let error = err.to_kernel(self.clock.epoch_ms());
                    self.record_publish_failed(job_id, &target.platform, error, attempts)?;
                    return Err(err);
                }
                Err(_) => {
                    tokio::time::sleep(self.config.publish_backoff.delay(attempts)).await;
                }
            }
        }
    }

    fn record_publish_failed(
        &self,
        job_id: JobId,
        platform: &str,
        error: KernelError,
        attempts: u32,
    ) -> Result<(), EngineError> {
        self.sink_error(&error);
        self.record(vec![Event::PublishFailed {
            job_id,
            platform: platform.to_string(),
            error,
            attempts,
        }])
    }
}

#[cfg(test)]
#[path = "publisher_tests.rs"]
mod tests;
