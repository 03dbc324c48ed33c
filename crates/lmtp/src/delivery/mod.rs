//! Delivery Fan-out (spec.md §4.6): after the body terminator, stream the
//! composed payload to local delivery and/or the outbound proxy, collecting
//! one per-recipient reply in envelope insertion order.

pub mod proxy;

use std::sync::Arc;

use store::{rawmail::RawMessageView, DeliveryHandle, DeliveryOutcome, MailStore};

use crate::reply::{codes, Reply};
use crate::session::{Recipient, Routing};

/// Deliver `composed` (trace headers + body) to every recipient in
/// `recipients`, in order, running local delivery under the recipient's uid
/// and reusing the first successful save as a copy source for the rest
/// (spec.md §4.6). Proxy recipients are handed to `proxy::relay` instead.
/// Returns the per-recipient replies plus whether a privilege-restore
/// failure occurred — fatal per spec.md §7, the caller must tear the session
/// down after flushing these replies.
pub async fn fan_out(
    store: &Arc<dyn MailStore>,
    proxy_client: &dyn proxy::ProxyClient,
    recipients: &[Recipient],
    composed: &[u8],
    base_dir: &std::path::Path,
) -> (Vec<Reply>, bool) {
    let view = RawMessageView::parse(composed);
    let mut replies = Vec::with_capacity(recipients.len());
    let mut reused: Option<DeliveryHandle> = None;
    let started_as_root = utils::privilege::is_root();
    let mut fatal_privilege_error = false;

    for recipient in recipients {
        if fatal_privilege_error {
            replies.push(codes::privilege_fatal());
            continue;
        }
        let reply = match &recipient.routing {
            Routing::Local => {
                let (reply, ok) = deliver_local(store, recipient, &view, &mut reused).await;
                if !ok {
                    fatal_privilege_error = true;
                }
                reply
            }
            Routing::Proxy(target) => proxy_client.relay(recipient, target, composed).await,
        };
        replies.push(reply);
    }

    if started_as_root && utils::privilege::restore_root_and_rebase(base_dir).is_err() {
        fatal_privilege_error = true;
    }
    (replies, fatal_privilege_error)
}

/// Deliver to one local recipient, switching to its uid first if the process
/// is currently privileged, and restoring euid 0 immediately after so the
/// next recipient's switch succeeds (spec.md §4.6). The returned `bool` is
/// `false` on a privilege-restore failure, which is fatal to the session
/// (spec.md §7).
async fn deliver_local(
    store: &Arc<dyn MailStore>,
    recipient: &Recipient,
    view: &RawMessageView,
    reused: &mut Option<DeliveryHandle>,
) -> (Reply, bool) {
    let Some(user) = &recipient.user_handle else {
        return (codes::temp_mailbox_fail(&recipient.address.to_canonical()), true);
    };

    let running_as_root = utils::privilege::is_root();
    if running_as_root && utils::privilege::switch_to_user(user.uid, user.gid).is_err() {
        return (codes::temp_mailbox_fail(&recipient.address.to_canonical()), true);
    }

    let (outcome, handle) = store.deliver(user, view, reused.as_ref()).await;
    if handle.is_some() {
        *reused = handle;
    }

    if running_as_root && utils::privilege::restore_euid_root().is_err() {
        return (codes::privilege_fatal(), false);
    }

    let reply = match outcome {
        DeliveryOutcome::Accepted => Reply::new(
            250,
            Some("2.0.0"),
            format!("{} delivered", recipient.address.to_canonical()),
        ),
        DeliveryOutcome::TemporaryFailure(reason) => Reply::new(
            451,
            Some("4.3.0"),
            format!("{} {reason}", recipient.address.to_canonical()),
        ),
        DeliveryOutcome::PermanentFailure(reason) => Reply::new(
            550,
            Some("5.1.1"),
            format!("{} {reason}", recipient.address.to_canonical()),
        ),
    };
    trc::event!(
        trc::EventType::DeliveryResult,
        "address" => recipient.address.to_canonical(),
        "code" => reply.code,
    )
    .log();
    (reply, true)
}
