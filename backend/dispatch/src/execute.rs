//! Query execution on the owning thread.

use nodebridge_config::DispatchConfig;
use nodebridge_core::{
    snapshot_host, ActionId, CallbackHandle, Direction, FetchFlags, FocusKind, Node, NodeId,
    NodeSource, Query, Request, RequestArguments, HOST_ID, ROOT_OWNER_ID,
};
use nodebridge_prefetch::{prefetch, verify_tree};
use tracing::{debug, error};

use crate::dispatcher::Dispatcher;
use crate::message::QueuedRequest;

/// Delivers results for one request; a request without a callback delivers
/// nothing.
struct Reply {
    callback: Option<CallbackHandle>,
    interaction_id: i64,
}

impl Reply {
    fn single(&self, node: Option<Node>) {
        if let Some(callback) = &self.callback {
            callback.deliver_single(node, self.interaction_id);
        }
    }

    fn batch(&self, nodes: Vec<Node>) {
        if let Some(callback) = &self.callback {
            callback.deliver_batch(nodes, self.interaction_id);
        }
    }

    fn prefetch(&self, nodes: Vec<Node>) {
        if let Some(callback) = &self.callback {
            callback.deliver_prefetch(nodes, self.interaction_id);
        }
    }

    fn action_result(&self, success: bool) {
        if let Some(callback) = &self.callback {
            callback.deliver_action_result(success, self.interaction_id);
        }
    }
}

/// Run one admitted request against `source`.
pub(crate) fn execute<S: NodeSource>(
    source: &mut S,
    dispatcher: &Dispatcher,
    config: &DispatchConfig,
    item: QueuedRequest,
) {
    let QueuedRequest {
        request,
        caller,
        pending_id,
    } = item;
    let Request {
        query,
        flags,
        interaction_id,
        callback,
    } = request;
    let kind = query.kind();

    if !dispatcher.begin_execution(pending_id) {
        debug!(interaction_id, %kind, "Already answered by an earlier fetch");
        return;
    }
    if !source.is_attached() {
        debug!(interaction_id, %kind, "Tree detached, query dropped");
        return;
    }
    debug!(interaction_id, %kind, caller = %caller, "Executing query");

    let flags = match query {
        Query::ClearAccessibilityFocus => {
            flags | FetchFlags::INCLUDE_NOT_IMPORTANT | FetchFlags::ACCESSIBILITY_TOOL
        }
        _ => flags,
    };
    let reply = Reply {
        callback,
        interaction_id,
    };

    source.set_fetch_flags(flags);
    match query {
        Query::ByNodeId {
            node_id,
            extra_args,
        } => by_node_id(
            source,
            dispatcher,
            config,
            node_id,
            extra_args.as_ref(),
            flags,
            &reply,
        ),
        Query::ByViewTag { owner_id, tag } => {
            reply.batch(by_view_tag(&*source, owner_id, &tag, flags));
        }
        Query::ByText {
            owner_id,
            descendant_id,
            text,
        } => reply.batch(by_text(&*source, owner_id, descendant_id, &text, flags)),
        Query::FindFocus {
            owner_id,
            descendant_id,
            focus_kind,
        } => reply.single(find_focus(&*source, owner_id, descendant_id, focus_kind, flags)),
        Query::FocusSearch {
            owner_id,
            direction,
        } => reply.single(focus_search(&*source, owner_id, direction)),
        Query::PerformAction {
            owner_id,
            descendant_id,
            action,
            args,
        } => {
            let success =
                perform_action(source, owner_id, descendant_id, action, args.as_ref(), flags);
            reply.action_result(success);
        }
        Query::ClearAccessibilityFocus => clear_accessibility_focus(source, flags),
        Query::NotifyOutsideTouch => notify_outside_touch(source),
    }
    source.reset_fetch_flags();
}

/// Whether a node may be shown to the caller.
fn exposed<S: NodeSource>(source: &S, handle: &S::Handle, flags: FetchFlags) -> bool {
    !source.is_data_sensitive(handle) || flags.contains(FetchFlags::ACCESSIBILITY_TOOL)
}

fn visible_root<S: NodeSource>(source: &S, owner_id: u32) -> Option<S::Handle> {
    source.lookup(owner_id).filter(|h| source.is_visible(h))
}

fn by_node_id<S: NodeSource>(
    source: &mut S,
    dispatcher: &Dispatcher,
    config: &DispatchConfig,
    node_id: NodeId,
    extra_args: Option<&RequestArguments>,
    flags: FetchFlags,
    reply: &Reply,
) {
    let handle = visible_root(&*source, node_id.owner_id);
    let primary = handle
        .as_ref()
        .and_then(|h| source.snapshot(h, node_id.descendant_id, extra_args));
    let interruptible = flags.is_interruptible();

    // Interruptible fetches answer the primary before prefetching.
    if interruptible {
        reply.single(primary.clone());
    }

    let mut prefetched = match &handle {
        Some(handle) => prefetch(
            &*source,
            primary.as_ref(),
            handle,
            flags.strategy(),
            config.max_prefetched_nodes(),
            || interruptible && dispatcher.has_queued_work(),
        ),
        None => Vec::new(),
    };
    let satisfied = dispatcher.satisfy(primary.as_ref(), &mut prefetched, flags);

    if config.enforce_tree_consistency() {
        let batch: Vec<Node> = primary.iter().chain(prefetched.iter()).cloned().collect();
        if let Err(e) = verify_tree(&batch) {
            error!(node = %node_id, error = %e, "Inconsistent result batch");
            panic!("inconsistent result batch for {node_id}: {e}");
        }
    }

    if interruptible {
        if !prefetched.is_empty() {
            reply.prefetch(prefetched);
        }
    } else {
        let mut batch = Vec::with_capacity(prefetched.len() + 1);
        batch.extend(primary);
        batch.extend(prefetched);
        reply.batch(batch);
    }

    if let Some(satisfied) = satisfied {
        satisfied.deliver();
    }
}

fn by_view_tag<S: NodeSource>(
    source: &S,
    owner_id: u32,
    tag: &str,
    flags: FetchFlags,
) -> Vec<Node> {
    let Some(root) = visible_root(source, owner_id) else {
        return Vec::new();
    };
    source
        .views_with_tag(&root, tag)
        .iter()
        .filter(|h| source.is_visible(h) && exposed(source, h, flags))
        .filter_map(|h| snapshot_host(source, h))
        .collect()
}

fn by_text<S: NodeSource>(
    source: &S,
    owner_id: u32,
    descendant_id: u32,
    text: &str,
    flags: FetchFlags,
) -> Vec<Node> {
    let Some(root) = visible_root(source, owner_id) else {
        return Vec::new();
    };
    if source.has_provider(&root) {
        return source.provider_find_by_text(&root, descendant_id, text);
    }
    if descendant_id != HOST_ID {
        return Vec::new();
    }
    let mut found = Vec::new();
    for view in source.views_with_text(&root, text) {
        if !source.is_visible(&view) || !exposed(source, &view, flags) {
            continue;
        }
        if source.has_provider(&view) {
            found.extend(source.provider_find_by_text(&view, HOST_ID, text));
        } else if let Some(node) = snapshot_host(source, &view) {
            found.push(node);
        }
    }
    found
}

fn find_focus<S: NodeSource>(
    source: &S,
    owner_id: u32,
    descendant_id: u32,
    kind: FocusKind,
    flags: FetchFlags,
) -> Option<Node> {
    let root = visible_root(source, owner_id)?;
    match kind {
        FocusKind::Accessibility => {
            let focus = source.accessibility_focus()?;
            let host = focus.host;
            if !source.is_descendant_of(&host, &root)
                || !source.is_visible(&host)
                || !exposed(source, &host, flags)
            {
                return None;
            }
            if source.has_provider(&host) {
                let virtual_descendant = focus.virtual_descendant?;
                source.snapshot(&host, virtual_descendant, None)
            } else if descendant_id == HOST_ID {
                snapshot_host(source, &host)
            } else {
                None
            }
        }
        FocusKind::Input => {
            let target = source
                .input_focus(&root)
                .filter(|h| source.is_visible(h) && exposed(source, h, flags))?;
            let from_provider = if source.has_provider(&target) {
                source.provider_find_focus(&target, FocusKind::Input)
            } else {
                None
            };
            from_provider.or_else(|| snapshot_host(source, &target))
        }
    }
}

fn focus_search<S: NodeSource>(source: &S, owner_id: u32, direction: Direction) -> Option<Node> {
    let root = visible_root(source, owner_id)?;
    let next = source.focus_search(&root, direction)?;
    snapshot_host(source, &next)
}

fn perform_action<S: NodeSource>(
    source: &mut S,
    owner_id: u32,
    descendant_id: u32,
    action: ActionId,
    args: Option<&RequestArguments>,
    flags: FetchFlags,
) -> bool {
    if !source.accepts_actions() {
        debug!(owner_id, "Tree not accepting actions");
        return false;
    }
    let Some(target) = source
        .lookup(owner_id)
        .filter(|h| source.is_visible(h) && exposed(&*source, h, flags))
    else {
        return false;
    };
    if !source.has_provider(&target) && descendant_id != HOST_ID {
        return false;
    }
    source.perform_action(&target, descendant_id, action, args)
}

fn clear_accessibility_focus<S: NodeSource>(source: &mut S, flags: FetchFlags) {
    let Some(focus) = source.accessibility_focus() else {
        return;
    };
    let Some(root) = source.lookup(ROOT_OWNER_ID) else {
        return;
    };
    if !source.is_descendant_of(&focus.host, &root) {
        return;
    }
    let owner_id = source.owner_id(&focus.host);
    let descendant_id = focus.virtual_descendant.unwrap_or(HOST_ID);
    let cleared = perform_action(
        source,
        owner_id,
        descendant_id,
        ActionId::CLEAR_ACCESSIBILITY_FOCUS,
        None,
        flags,
    );
    debug!(owner_id, descendant_id, cleared, "Accessibility focus cleared");
}

fn notify_outside_touch<S: NodeSource>(source: &mut S) {
    if !source.accepts_actions() {
        return;
    }
    if let Some(root) = visible_root(&*source, ROOT_OWNER_ID) {
        source.notify_outside_touch(&root);
    }
}
