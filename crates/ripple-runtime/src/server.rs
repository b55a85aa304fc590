//! Node event loop
//!
//! Bootstraps a node from `init`, then dispatches every request on its own
//! task. Replies to our own requests are resolved inline.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::{JoinError, JoinSet};

use ripple_core::{RippleError, RippleResult};
use ripple_transport::{ChannelOutbox, InboundReceiver, LineWriter, Outbox};
use ripple_wire::{Inbound, Message, Payload, Rejection};

use crate::{Node, NodeConfig};

/// Run a node until its input closes or a fatal error occurs.
pub async fn serve(
    mut inbound: InboundReceiver,
    outbox: Arc<dyn Outbox>,
    config: NodeConfig,
) -> RippleResult<()> {
    config.validate()?;

    let Some(node) = bootstrap(&mut inbound, &outbox, &config).await? else {
        tracing::info!("input closed before init");
        return Ok(());
    };
    tracing::info!(node = %node.id(), cluster = node.cluster().len(), "node initialized");

    let mut requests: JoinSet<RippleResult<()>> = JoinSet::new();

    loop {
        tokio::select! {
            next = inbound.recv() => {
                let Some(next) = next else { break };
                dispatch(&node, next, &mut requests);
            }
            Some(done) = requests.join_next() => check(done)?,
        }
    }

    while let Some(done) = requests.join_next().await {
        check(done)?;
    }

    let stats = node.stats();
    tracing::info!(
        node = %node.id(),
        accepted = stats.accepted,
        duplicates = stats.duplicates,
        gossip_sent = stats.diffusion.gossip_sent,
        in_flight = node.gossip_in_flight(),
        "input closed, stopping"
    );
    Ok(())
}

/// How long queued output may take to reach the sink on exit
pub const FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

/// Run a node whose outbox is drained by `writer`.
///
/// On end of input the queued output is flushed before returning. A
/// failing writer stops the node with the writer's error.
pub async fn run(
    inbound: InboundReceiver,
    outbox: ChannelOutbox,
    mut writer: LineWriter,
    config: NodeConfig,
) -> RippleResult<()> {
    let served = tokio::select! {
        served = serve(inbound, Arc::new(outbox), config) => served,
        stopped = writer.stopped() => {
            tracing::error!("output closed while serving");
            return stopped.and(Err(RippleError::TransportClosed));
        }
    };

    let flushed = writer.finish(FLUSH_TIMEOUT).await;
    served.and(flushed)
}

/// Wait for `init`; everything before it is refused.
async fn bootstrap(
    inbound: &mut InboundReceiver,
    outbox: &Arc<dyn Outbox>,
    config: &NodeConfig,
) -> RippleResult<Option<Node>> {
    while let Some(next) = inbound.recv().await {
        let message = match next {
            Inbound::Message(message) => message,
            Inbound::Rejected(rejection) => {
                answer_rejection(outbox.as_ref(), &rejection);
                continue;
            }
        };

        let Payload::Init { node_id, node_ids } = &message.body.payload else {
            if message.expects_reply() {
                send_or_log(
                    outbox.as_ref(),
                    message.error_reply(&RippleError::NotInitialized),
                );
            }
            continue;
        };

        let node = Node::new(
            node_id.clone(),
            node_ids.clone(),
            Arc::clone(outbox),
            config,
        );
        outbox.send(message.reply(Payload::InitOk))?;
        return Ok(Some(node));
    }

    Ok(None)
}

fn dispatch(node: &Node, next: Inbound, requests: &mut JoinSet<RippleResult<()>>) {
    match next {
        Inbound::Rejected(rejection) => {
            node.record_rejected();
            answer_rejection(node.outbox(), &rejection);
        }
        Inbound::Message(message) if message.is_response() => {
            if !node.route_reply(message) {
                tracing::trace!("dropped reply");
            }
        }
        Inbound::Message(message) => {
            let node = node.clone();
            requests.spawn(async move { node.handle(message) });
        }
    }
}

fn check(done: Result<RippleResult<()>, JoinError>) -> RippleResult<()> {
    match done {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) if e.is_fatal() => {
            tracing::error!("fatal: {}", e);
            Err(e)
        }
        Ok(Err(e)) => {
            tracing::warn!("request failed: {}", e);
            Ok(())
        }
        Err(e) => {
            tracing::error!("request handler panicked: {}", e);
            Err(RippleError::Invariant(format!("request handler panicked: {e}")))
        }
    }
}

fn answer_rejection(outbox: &dyn Outbox, rejection: &Rejection) {
    tracing::warn!(from = %rejection.src, "rejected input: {}", rejection.error);
    if let Some(reply) = rejection.reply() {
        send_or_log(outbox, reply);
    }
}

fn send_or_log(outbox: &dyn Outbox, message: Message) {
    if let Err(e) = outbox.send(message) {
        tracing::warn!("could not send reply: {}", e);
    }
}
