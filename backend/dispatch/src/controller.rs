use std::sync::Arc;

use nodebridge_config::DispatchConfig;
use nodebridge_core::{CallerIdentity, NodeBridgeError, NodeSource, Request};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::client::InteractionClient;
use crate::dispatcher::{Admission, Dispatcher};
use crate::execute::execute;
use crate::message::{Message, MessageSender};
use crate::preparer::RequestPreparer;

enum LoopEvent {
    Message(Option<Message>),
    Deadline,
}

/// The owning thread's side of the bridge: holds the tree and runs every
/// query against it.
///
/// Drive it either with [`run`](Self::run) or by calling
/// [`pump`](Self::pump) from an existing event loop.
pub struct InteractionController<S: NodeSource> {
    source: S,
    dispatcher: Arc<Dispatcher>,
    rx: mpsc::UnboundedReceiver<Message>,
    config: DispatchConfig,
    /// Generation and deadline of the open preparation session.
    deadline: Option<(u64, Instant)>,
    stopped: bool,
}

impl<S: NodeSource> InteractionController<S> {
    pub fn new(source: S, config: DispatchConfig, owner: CallerIdentity) -> Self {
        let (sender, rx) = MessageSender::channel();
        Self {
            source,
            dispatcher: Arc::new(Dispatcher::new(owner, sender, config.preparer_timeout())),
            rx,
            config,
            deadline: None,
            stopped: false,
        }
    }

    pub fn client(&self) -> InteractionClient {
        InteractionClient::new(Arc::clone(&self.dispatcher))
    }

    pub fn owner(&self) -> CallerIdentity {
        self.dispatcher.owner()
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    /// Submit from the owning thread. Runs inline when the fast path applies,
    /// otherwise the query is queued like any other.
    pub fn submit(&mut self, request: Request, caller: CallerIdentity) -> Result<(), NodeBridgeError> {
        if self.stopped {
            debug!(interaction_id = request.interaction_id, "Controller stopped, query dropped");
            return Ok(());
        }
        if let Admission::Inline(item) = self.dispatcher.admit(request, caller, true)? {
            execute(&mut self.source, &self.dispatcher, &self.config, item);
        }
        Ok(())
    }

    pub fn register_preparer(&self, owner_id: u32, preparer: Arc<dyn RequestPreparer>) {
        self.dispatcher.register_preparer(owner_id, preparer);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Handle everything currently queued, firing an expired preparation
    /// timeout first. Returns the number of events handled.
    pub fn pump(&mut self) -> usize {
        let mut handled = 0;
        if self.fire_expired_deadline() {
            handled += 1;
        }
        while let Ok(message) = self.rx.try_recv() {
            self.handle(message);
            handled += 1;
        }
        if self.stopped {
            self.teardown();
        }
        handled
    }

    /// Serve the queue until shut down.
    pub async fn run(mut self) {
        info!(owner = %self.owner(), "Interaction controller started");
        while !self.stopped {
            let deadline = self.deadline.map(|(_, at)| at);
            let event = tokio::select! {
                message = self.rx.recv() => LoopEvent::Message(message),
                _ = deadline_elapsed(deadline) => LoopEvent::Deadline,
            };
            match event {
                LoopEvent::Message(Some(message)) => self.handle(message),
                LoopEvent::Message(None) => break,
                LoopEvent::Deadline => self.fire_deadline(),
            }
        }
        self.teardown();
        info!(owner = %self.owner(), "Interaction controller stopped");
    }

    fn handle(&mut self, message: Message) {
        self.dispatcher.sender().mark_dequeued();
        if self.stopped {
            return;
        }
        match message {
            Message::Execute(item) => {
                execute(&mut self.source, &self.dispatcher, &self.config, item);
            }
            Message::Prepare {
                preparer,
                descendant_id,
                extra_data_key,
                args,
                token,
            } => {
                debug!(generation = token.generation(), descendant_id, key = %extra_data_key, "Invoking preparer");
                preparer.prepare(descendant_id, &extra_data_key, &args, token);
            }
            Message::PreparerDone { generation } => {
                if self.dispatcher.on_preparer_done(generation)
                    && self.deadline.is_some_and(|(g, _)| g == generation)
                {
                    self.deadline = None;
                }
            }
            Message::ArmTimeout { generation, at } => {
                if self.dispatcher.is_current_generation(generation) {
                    self.deadline = Some((generation, at));
                }
            }
            Message::Shutdown => {
                info!(owner = %self.owner(), "Shutdown requested");
                self.stopped = true;
            }
        }
    }

    fn fire_expired_deadline(&mut self) -> bool {
        match self.deadline {
            Some((_, at)) if Instant::now() >= at => {
                self.fire_deadline();
                true
            }
            _ => false,
        }
    }

    fn fire_deadline(&mut self) {
        if let Some((generation, _)) = self.deadline.take() {
            self.dispatcher.on_timeout(generation);
        }
    }

    /// Drop queued messages and forget pending and held requests.
    fn teardown(&mut self) {
        let mut dropped = 0;
        while self.rx.try_recv().is_ok() {
            self.dispatcher.sender().mark_dequeued();
            dropped += 1;
        }
        self.deadline = None;
        self.dispatcher.teardown();
        debug!(dropped, "Controller torn down");
    }
}

impl<S: NodeSource> Drop for InteractionController<S> {
    fn drop(&mut self) {
        self.dispatcher.teardown();
    }
}

async fn deadline_elapsed(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use nodebridge_core::{
        ActionId, ChannelCallback, Delivery, FetchFlags, FocusKind, MemoryTree, Node, NodeId,
        Query, RequestArguments, TreeSpec, HOST_ID, ROOT_OWNER_ID,
    };
    use parking_lot::Mutex;
    use tokio::sync::mpsc::UnboundedReceiver;

    use super::*;
    use crate::preparer::CompletionToken;

    const OWNER: CallerIdentity = CallerIdentity::new(100, 1);
    const REMOTE: CallerIdentity = CallerIdentity::new(200, 7);

    const FIXTURE: &str = r#"
root: 1
accessibilityFocus:
  host: 3
views:
  - id: 1
    children: [2, 3]
  - id: 2
    children: [4, 5]
    text: Header
    tag: header
    extras:
      bounds: [0, 0, 100, 20]
  - id: 3
    text: Submit
    tag: button
    focusable: true
  - id: 4
    text: Title
  - id: 5
    text: Password
    tag: secret
    sensitive: true
"#;

    fn tree() -> MemoryTree {
        let spec: TreeSpec = serde_yaml::from_str(FIXTURE).unwrap();
        MemoryTree::from_spec(spec)
    }

    fn controller() -> InteractionController<MemoryTree> {
        InteractionController::new(tree(), DispatchConfig::default(), OWNER)
    }

    fn by_id(owner: u32, flags: FetchFlags, interaction_id: i64) -> Request {
        Request::new(
            Query::ByNodeId {
                node_id: NodeId::host(owner),
                extra_args: None,
            },
            flags,
            interaction_id,
        )
    }

    fn drain(rx: &mut UnboundedReceiver<Delivery>) -> Vec<Delivery> {
        std::iter::from_fn(|| rx.try_recv().ok()).collect()
    }

    fn ids(nodes: &[Node]) -> Vec<NodeId> {
        nodes.iter().map(|n| n.id).collect()
    }

    /// Keeps every token so the test decides when preparers finish.
    #[derive(Default)]
    struct HeldPreparer {
        calls: Mutex<Vec<(u32, String)>>,
        tokens: Mutex<Vec<CompletionToken>>,
    }

    impl RequestPreparer for HeldPreparer {
        fn prepare(
            &self,
            descendant_id: u32,
            extra_data_key: &str,
            _args: &RequestArguments,
            token: CompletionToken,
        ) {
            self.calls
                .lock()
                .push((descendant_id, extra_data_key.to_string()));
            self.tokens.lock().push(token);
        }
    }

    fn extra_data_request(owner: u32, interaction_id: i64) -> Request {
        Request::new(
            Query::ByNodeId {
                node_id: NodeId::host(owner),
                extra_args: Some(RequestArguments::extra_data("bounds")),
            },
            FetchFlags::empty(),
            interaction_id,
        )
    }

    #[test]
    fn test_fast_path_matches_queued_path() {
        let flags = FetchFlags::PREFETCH_SIBLINGS | FetchFlags::PREFETCH_DESCENDANTS_DEPTH_FIRST;

        let mut inline = controller();
        let (callback, mut inline_rx) = ChannelCallback::new();
        inline
            .submit(by_id(2, flags, 1).with_callback(callback), OWNER)
            .unwrap();
        // Delivered without pumping.
        let inline_deliveries = drain(&mut inline_rx);
        assert!(!inline_deliveries.is_empty());

        let mut queued = controller();
        let (callback, mut queued_rx) = ChannelCallback::new();
        queued
            .client()
            .submit(by_id(2, flags, 1).with_callback(callback), OWNER)
            .unwrap();
        assert!(drain(&mut queued_rx).is_empty());
        queued.pump();

        assert_eq!(inline_deliveries, drain(&mut queued_rx));
    }

    #[test]
    fn test_other_callers_on_owner_thread_are_queued() {
        let mut controller = controller();
        let (callback, mut rx) = ChannelCallback::new();
        controller
            .submit(by_id(2, FetchFlags::empty(), 1).with_callback(callback), REMOTE)
            .unwrap();
        assert!(drain(&mut rx).is_empty());
        assert_eq!(controller.pump(), 1);
        assert_eq!(drain(&mut rx).len(), 1);
    }

    #[test]
    fn test_held_queries_run_in_arrival_order() {
        let mut controller = controller();
        let client = controller.client();
        let preparer = Arc::new(HeldPreparer::default());
        client.register_preparer(2, preparer.clone());

        let (callback, mut rx) = ChannelCallback::new();
        client
            .submit(extra_data_request(2, 1).with_callback(callback.clone()), REMOTE)
            .unwrap();
        for (owner, id) in [(3, 2), (4, 3)] {
            client
                .submit(by_id(owner, FetchFlags::empty(), id).with_callback(callback.clone()), REMOTE)
                .unwrap();
        }

        controller.pump();
        assert!(drain(&mut rx).is_empty());
        assert_eq!(*preparer.calls.lock(), vec![(HOST_ID, "bounds".to_string())]);

        let token = preparer.tokens.lock().pop().unwrap();
        token.complete();
        controller.pump();

        let deliveries = drain(&mut rx);
        let order: Vec<i64> = deliveries.iter().map(Delivery::interaction_id).collect();
        assert_eq!(order, vec![1, 2, 3]);
        let Delivery::Single { node: Some(node), .. } = &deliveries[0] else {
            panic!("expected a single node");
        };
        assert!(node.extras.contains_key("bounds"));
    }

    #[test]
    fn test_queries_without_extra_data_skip_preparers() {
        let mut controller = controller();
        let preparer = Arc::new(HeldPreparer::default());
        controller.register_preparer(2, preparer.clone());

        let (callback, mut rx) = ChannelCallback::new();
        controller
            .client()
            .submit(by_id(2, FetchFlags::empty(), 1).with_callback(callback), REMOTE)
            .unwrap();
        controller.pump();
        assert_eq!(drain(&mut rx).len(), 1);
        assert!(preparer.calls.lock().is_empty());
    }

    #[test]
    fn test_unregistered_preparers_no_longer_hold() {
        let mut controller = controller();
        let client = controller.client();
        let preparer = Arc::new(HeldPreparer::default());
        client.register_preparer(2, preparer.clone());
        client.unregister_preparers(2);

        let (callback, mut rx) = ChannelCallback::new();
        client
            .submit(extra_data_request(2, 1).with_callback(callback), REMOTE)
            .unwrap();
        controller.pump();
        assert_eq!(drain(&mut rx).len(), 1);
        assert!(preparer.calls.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_releases_held_queries_when_pumped() {
        let mut controller = controller();
        let client = controller.client();
        let preparer = Arc::new(HeldPreparer::default());
        client.register_preparer(2, preparer.clone());

        let (callback, mut rx) = ChannelCallback::new();
        client
            .submit(extra_data_request(2, 1).with_callback(callback.clone()), REMOTE)
            .unwrap();
        client
            .submit(by_id(3, FetchFlags::empty(), 2).with_callback(callback), REMOTE)
            .unwrap();
        controller.pump();

        tokio::time::advance(Duration::from_millis(499)).await;
        controller.pump();
        assert!(drain(&mut rx).is_empty());

        tokio::time::advance(Duration::from_millis(2)).await;
        controller.pump();
        let order: Vec<i64> = drain(&mut rx).iter().map(Delivery::interaction_id).collect();
        assert_eq!(order, vec![1, 2]);

        // A preparer finishing after the timeout changes nothing.
        let token = preparer.tokens.lock().pop().unwrap();
        token.complete();
        controller.pump();
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_releases_held_queries_in_run_loop() {
        let controller = controller();
        let client = controller.client();
        client.register_preparer(2, Arc::new(HeldPreparer::default()));
        let handle = tokio::spawn(controller.run());

        let (callback, mut rx) = ChannelCallback::new();
        let start = Instant::now();
        client
            .submit(extra_data_request(2, 1).with_callback(callback), REMOTE)
            .unwrap();

        let delivery = rx.recv().await.unwrap();
        let waited = start.elapsed();
        assert_eq!(delivery.interaction_id(), 1);
        assert!(waited >= Duration::from_millis(500), "released after {waited:?}");
        assert!(waited < Duration::from_millis(600), "released after {waited:?}");

        client.shutdown();
        handle.await.unwrap();
    }

    #[test]
    fn test_pending_duplicate_satisfied_once() {
        let mut controller = controller();
        let client = controller.client();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let callback = ChannelCallback::with_sender(tx);

        let dfs = FetchFlags::PREFETCH_DESCENDANTS_DEPTH_FIRST | FetchFlags::PREFETCH_UNINTERRUPTIBLE;
        client
            .submit(by_id(1, dfs, 10).with_callback(callback.clone()), REMOTE)
            .unwrap();
        client
            .submit(by_id(4, FetchFlags::empty(), 11).with_callback(callback.clone()), REMOTE)
            .unwrap();
        client
            .submit(by_id(4, FetchFlags::empty(), 12).with_callback(callback), REMOTE)
            .unwrap();
        controller.pump();

        let deliveries = drain(&mut rx);
        assert_eq!(deliveries.len(), 3);
        let Delivery::Batch { nodes, interaction_id: 10 } = &deliveries[0] else {
            panic!("expected the batch first: {:?}", deliveries[0]);
        };
        assert_eq!(
            ids(nodes),
            vec![NodeId::host(1), NodeId::host(2), NodeId::host(5), NodeId::host(3)]
        );
        for (delivery, expected_id) in deliveries[1..].iter().zip([11, 12]) {
            let Delivery::Single { node: Some(node), interaction_id } = delivery else {
                panic!("expected a single node: {delivery:?}");
            };
            assert_eq!(*interaction_id, expected_id);
            assert_eq!(node.id, NodeId::host(4));
        }
        assert_eq!(controller.dispatcher.pending_len(), 0);
    }

    #[test]
    fn test_incompatible_flags_are_not_merged() {
        let mut controller = controller();
        let client = controller.client();
        let (callback, mut rx) = ChannelCallback::new();
        client
            .submit(
                by_id(
                    1,
                    FetchFlags::PREFETCH_DESCENDANTS_BREADTH_FIRST | FetchFlags::PREFETCH_UNINTERRUPTIBLE,
                    1,
                )
                .with_callback(callback.clone()),
                REMOTE,
            )
            .unwrap();
        client
            .submit(by_id(3, FetchFlags::REPORT_VIEW_IDS, 2).with_callback(callback), REMOTE)
            .unwrap();
        controller.pump();

        let deliveries = drain(&mut rx);
        let Delivery::Single { node: Some(node), interaction_id: 2 } = deliveries.last().unwrap() else {
            panic!("expected the second query to run itself");
        };
        // Only a fetch with view ids reports the tag.
        assert_eq!(node.view_tag.as_deref(), Some("button"));
    }

    #[test]
    fn test_prefetch_yields_to_queued_work() {
        let mut controller = controller();
        let client = controller.client();
        let (callback, mut rx) = ChannelCallback::new();
        let dfs = FetchFlags::PREFETCH_DESCENDANTS_DEPTH_FIRST;
        client
            .submit(by_id(1, dfs, 1).with_callback(callback.clone()), REMOTE)
            .unwrap();
        client
            .submit(by_id(2, dfs | FetchFlags::PREFETCH_UNINTERRUPTIBLE, 2).with_callback(callback), REMOTE)
            .unwrap();
        controller.pump();

        let deliveries = drain(&mut rx);
        assert_eq!(deliveries.len(), 2);
        // The first fetch saw the second one waiting and skipped prefetch.
        assert!(matches!(deliveries[0], Delivery::Single { interaction_id: 1, .. }));
        let Delivery::Batch { nodes, interaction_id: 2 } = &deliveries[1] else {
            panic!("expected an uninterrupted batch: {:?}", deliveries[1]);
        };
        assert_eq!(
            ids(nodes),
            vec![NodeId::host(2), NodeId::host(4), NodeId::host(5)]
        );
    }

    #[test]
    fn test_prefetch_respects_configured_cap() {
        let config = DispatchConfig {
            max_prefetched_nodes: Some(2),
            ..Default::default()
        };
        let mut controller = InteractionController::new(tree(), config, OWNER);
        let (callback, mut rx) = ChannelCallback::new();
        controller
            .submit(
                by_id(1, FetchFlags::PREFETCH_DESCENDANTS_BREADTH_FIRST, 1).with_callback(callback),
                OWNER,
            )
            .unwrap();
        let deliveries = drain(&mut rx);
        let Delivery::Prefetch { nodes, .. } = &deliveries[1] else {
            panic!("expected prefetch: {deliveries:?}");
        };
        assert_eq!(ids(nodes), vec![NodeId::host(2), NodeId::host(3)]);
    }

    #[test]
    fn test_missing_node_delivers_none() {
        let mut controller = controller();
        let (callback, mut rx) = ChannelCallback::new();
        controller
            .submit(by_id(99, FetchFlags::PREFETCH_ANCESTORS | FetchFlags::PREFETCH_SIBLINGS, 5).with_callback(callback), OWNER)
            .unwrap();
        assert_eq!(
            drain(&mut rx),
            vec![Delivery::Single {
                node: None,
                interaction_id: 5
            }]
        );
    }

    #[test]
    fn test_detached_tree_drops_queries() {
        let mut controller = controller();
        controller.source_mut().detach();
        let (callback, mut rx) = ChannelCallback::new();
        controller
            .client()
            .submit(by_id(2, FetchFlags::empty(), 1).with_callback(callback), REMOTE)
            .unwrap();
        controller.pump();
        assert!(drain(&mut rx).is_empty());
        assert_eq!(controller.dispatcher.pending_len(), 0);
    }

    #[test]
    fn test_contract_violations_fail_fast() {
        let mut controller = controller();
        let (callback, _rx) = ChannelCallback::new();
        let both = FetchFlags::PREFETCH_DESCENDANTS_DEPTH_FIRST
            | FetchFlags::PREFETCH_DESCENDANTS_BREADTH_FIRST;
        let result = controller
            .client()
            .submit(by_id(1, both, 1).with_callback(callback), REMOTE);
        assert!(matches!(result, Err(NodeBridgeError::ConflictingStrategies(_))));

        let result = controller.submit(by_id(1, FetchFlags::empty(), 2), OWNER);
        assert!(matches!(result, Err(NodeBridgeError::MissingCallback(_))));
        assert_eq!(controller.pump(), 0);
    }

    #[test]
    fn test_sensitive_nodes_need_accessibility_tool() {
        let mut controller = controller();
        let (callback, mut rx) = ChannelCallback::new();
        let by_tag = |flags, id| {
            Request::new(
                Query::ByViewTag {
                    owner_id: ROOT_OWNER_ID,
                    tag: "secret".to_string(),
                },
                flags,
                id,
            )
            .with_callback(callback.clone())
        };
        controller.submit(by_tag(FetchFlags::empty(), 1), OWNER).unwrap();
        controller
            .submit(by_tag(FetchFlags::ACCESSIBILITY_TOOL, 2), OWNER)
            .unwrap();

        let deliveries = drain(&mut rx);
        assert!(matches!(&deliveries[0], Delivery::Batch { nodes, .. } if nodes.is_empty()));
        assert!(matches!(&deliveries[1], Delivery::Batch { nodes, .. } if ids(nodes) == vec![NodeId::host(5)]));
    }

    #[test]
    fn test_find_by_text_and_focus() {
        let mut controller = controller();
        let (callback, mut rx) = ChannelCallback::new();
        controller
            .submit(
                Request::new(
                    Query::ByText {
                        owner_id: ROOT_OWNER_ID,
                        descendant_id: HOST_ID,
                        text: "ti".to_string(),
                    },
                    FetchFlags::empty(),
                    1,
                )
                .with_callback(callback.clone()),
                OWNER,
            )
            .unwrap();
        controller
            .submit(
                Request::new(
                    Query::FindFocus {
                        owner_id: ROOT_OWNER_ID,
                        descendant_id: HOST_ID,
                        focus_kind: FocusKind::Accessibility,
                    },
                    FetchFlags::empty(),
                    2,
                )
                .with_callback(callback),
                OWNER,
            )
            .unwrap();

        let deliveries = drain(&mut rx);
        assert!(matches!(&deliveries[0], Delivery::Batch { nodes, .. } if ids(nodes) == vec![NodeId::host(4)]));
        assert!(matches!(
            &deliveries[1],
            Delivery::Single { node: Some(node), .. } if node.id == NodeId::host(3) && node.accessibility_focused
        ));
    }

    #[test]
    fn test_actions_respect_interactivity() {
        let mut controller = controller();
        let (callback, mut rx) = ChannelCallback::new();
        let click = |owner, descendant_id, id| {
            Request::new(
                Query::PerformAction {
                    owner_id: owner,
                    descendant_id,
                    action: ActionId::CLICK,
                    args: None,
                },
                FetchFlags::empty(),
                id,
            )
            .with_callback(callback.clone())
        };
        controller.submit(click(3, HOST_ID, 1), OWNER).unwrap();
        // A plain node has no virtual descendants to act on.
        controller.submit(click(3, 7, 2), OWNER).unwrap();
        controller.source_mut().set_interactive(false);
        controller.submit(click(3, HOST_ID, 3), OWNER).unwrap();

        let results: Vec<bool> = drain(&mut rx)
            .into_iter()
            .map(|d| matches!(d, Delivery::ActionResult { success: true, .. }))
            .collect();
        assert_eq!(results, vec![true, false, false]);
        assert_eq!(controller.source().performed_actions().len(), 1);
    }

    #[test]
    fn test_internal_queries_run_inline_from_owner_thread() {
        let mut controller = controller();
        assert_eq!(controller.source().current_accessibility_focus(), Some(NodeId::host(3)));

        controller
            .submit(Request::new(Query::ClearAccessibilityFocus, FetchFlags::empty(), 0), REMOTE)
            .unwrap();
        controller
            .submit(Request::new(Query::NotifyOutsideTouch, FetchFlags::empty(), 0), REMOTE)
            .unwrap();

        assert_eq!(controller.source().current_accessibility_focus(), None);
        assert_eq!(controller.source().outside_touches(), 1);
    }

    #[test]
    fn test_shutdown_drops_queued_and_later_queries() {
        let mut controller = controller();
        let client = controller.client();
        let (callback, mut rx) = ChannelCallback::new();
        client.shutdown();
        client
            .submit(by_id(2, FetchFlags::empty(), 1).with_callback(callback.clone()), REMOTE)
            .unwrap();
        controller.pump();
        assert!(controller.is_stopped());

        client
            .submit(by_id(3, FetchFlags::empty(), 2).with_callback(callback), REMOTE)
            .unwrap();
        controller.pump();
        assert!(drain(&mut rx).is_empty());
        assert_eq!(controller.dispatcher.pending_len(), 0);
    }

    #[tokio::test]
    async fn test_submissions_after_run_returns_are_dropped() {
        let controller = controller();
        let dispatcher = Arc::clone(&controller.dispatcher);
        let client = controller.client();
        client.register_preparer(2, Arc::new(HeldPreparer::default()));
        let handle = tokio::spawn(controller.run());
        client.shutdown();
        handle.await.unwrap();

        let (callback, mut rx) = ChannelCallback::new();
        for interaction_id in 0..1000 {
            client
                .submit(
                    by_id(3, FetchFlags::empty(), interaction_id).with_callback(callback.clone()),
                    REMOTE,
                )
                .unwrap();
        }
        client
            .submit(extra_data_request(2, 1000).with_callback(callback), REMOTE)
            .unwrap();
        assert_eq!(dispatcher.pending_len(), 0);
        assert_eq!(dispatcher.held_len(), 0);
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_dropped_controller_refuses_queries() {
        let controller = controller();
        let dispatcher = Arc::clone(&controller.dispatcher);
        let client = controller.client();
        drop(controller);

        let (callback, _rx) = ChannelCallback::new();
        for interaction_id in 0..10 {
            client
                .submit(
                    by_id(2, FetchFlags::empty(), interaction_id).with_callback(callback.clone()),
                    REMOTE,
                )
                .unwrap();
        }
        assert_eq!(dispatcher.pending_len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_preparer_timeout_counts_from_session_start() {
        let mut controller = controller();
        let client = controller.client();
        client.register_preparer(2, Arc::new(HeldPreparer::default()));

        let (callback, mut rx) = ChannelCallback::new();
        client
            .submit(extra_data_request(2, 1).with_callback(callback), REMOTE)
            .unwrap();

        // The owning loop is busy elsewhere before it first sees the session.
        tokio::time::advance(Duration::from_millis(400)).await;
        controller.pump();
        assert!(drain(&mut rx).is_empty());

        tokio::time::advance(Duration::from_millis(101)).await;
        controller.pump();
        let order: Vec<i64> = drain(&mut rx).iter().map(Delivery::interaction_id).collect();
        assert_eq!(order, vec![1]);
    }

    #[test]
    #[should_panic(expected = "inconsistent result batch")]
    fn test_consistency_violation_panics() {
        let spec: TreeSpec = serde_yaml::from_str(
            r#"
root: 1
inputFocus: 2
views:
  - id: 1
    children: [2, 3]
  - id: 2
  - id: 3
    provider:
      - id: 9
        focused: true
"#,
        )
        .unwrap();
        let config = DispatchConfig {
            enforce_tree_consistency: Some(true),
            ..Default::default()
        };
        let mut controller = InteractionController::new(MemoryTree::from_spec(spec), config, OWNER);
        let (callback, _rx) = ChannelCallback::new();
        controller
            .submit(
                by_id(1, FetchFlags::PREFETCH_DESCENDANTS_DEPTH_FIRST, 1).with_callback(callback),
                OWNER,
            )
            .unwrap();
    }
}
