use std::{sync::Arc, time::Duration};

use futures::StreamExt;
use k8s_openapi::api::batch::v1::Job;
use kube::{
    Api,
    runtime::{
        Controller,
        controller::{self, Action},
        reflector::ObjectRef,
        watcher,
    },
};
use tfreq_core::{ControllerError, Reconciler, Requeue};
use tfreq_model::{ObjectKey, TerraformRequest};
use tracing::{debug, info, warn};

/// State shared by every reconcile the controller dispatches.
#[derive(Debug)]
pub struct Context {
    pub reconciler: Reconciler,
    /// Delay used for `Requeue::Immediate` while jobs are still running.
    pub running_poll_interval: Duration,
    pub error_backoff: Duration,
}

/// Translates the core's requeue decision into a controller action.
pub fn requeue_action(
    requeue: Requeue,
    running_poll_interval: Duration,
) -> Action {
    match requeue {
        Requeue::Done => Action::await_change(),
        Requeue::Immediate => Action::requeue(running_poll_interval),
        Requeue::After(delay) => Action::requeue(delay),
    }
}

pub async fn reconcile(
    request: Arc<TerraformRequest>,
    ctx: Arc<Context>,
) -> Result<Action, ControllerError> {
    let key = ObjectKey::of(request.as_ref());
    let requeue = ctx.reconciler.reconcile(&key).await?;
    Ok(requeue_action(requeue, ctx.running_poll_interval))
}

pub fn error_policy(
    request: Arc<TerraformRequest>,
    error: &ControllerError,
    ctx: Arc<Context>,
) -> Action {
    warn!(
        request = %ObjectKey::of(request.as_ref()),
        error = %error,
        retry_in = ?ctx.error_backoff,
        "reconcile failed"
    );
    Action::requeue(ctx.error_backoff)
}

/// Runs the controller until a shutdown signal arrives. Any change to a
/// request or to a job it controls schedules that request.
pub async fn run(
    requests: Api<TerraformRequest>,
    jobs: Api<Job>,
    ctx: Arc<Context>,
    max_concurrent_reconciles: usize,
) {
    let concurrency =
        u16::try_from(max_concurrent_reconciles).unwrap_or(u16::MAX);
    info!(concurrency, "starting TerraformRequest controller");

    Controller::new(requests, watcher::Config::default())
        .owns(jobs, watcher::Config::default())
        .with_config(controller::Config::default().concurrency(concurrency))
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(|result| async move {
            match result {
                Ok((request, action)) => {
                    debug!(
                        request = %display_ref(&request),
                        ?action,
                        "reconciled"
                    );
                }
                Err(err) => warn!(error = %err, "controller error"),
            }
        })
        .await;

    info!("controller stopped");
}

fn display_ref(reference: &ObjectRef<TerraformRequest>) -> String {
    match &reference.namespace {
        Some(namespace) => format!("{namespace}/{}", reference.name),
        None => reference.name.clone(),
    }
}
