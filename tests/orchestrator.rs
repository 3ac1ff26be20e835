/*
 * tests/orchestrator.rs
 *
 * Pipeline runs against scripted mock LLMs: initial generation, chat-driven
 * edits, propose mode, failure policy, deadlines, cancellation, and version
 * conflict retries.
 */

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::json;
use wayfarer::CoreError;
use wayfarer::agent::agents::register_default_agents;
use wayfarer::agent::{
	Agent, AgentContext, AgentOutput, AgentRegistry, Orchestrator, TaskKind, cancel_pair,
};
use wayfarer::bus::{AgentStatus, EventBus};
use wayfarer::llm::{LlmGateway, LlmTaskKind, MockLLM, ProviderConfig};
use wayfarer::models::changeset::{ChangeOp, ChangeSet, NodeDraft, OpOutcome};
use wayfarer::models::chat::{ChatRequest, RunStatus};
use wayfarer::models::itinerary::{Itinerary, ItineraryStatus, NodeType};
use wayfarer::places::{MockPlaces, PlaceInfo, PlacesClient};
use wayfarer::store::{DocumentStore, InMemoryStore};

fn date(s: &str) -> NaiveDate {
	NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

fn scripted(
	providers: Vec<(LlmTaskKind, Vec<&str>)>,
) -> Arc<LlmGateway> {
	let mut builder = LlmGateway::builder();
	for (task, responses) in providers {
		builder = builder.provider(
			task,
			Arc::new(MockLLM::scripted(responses)),
			ProviderConfig::for_model("mock"),
		);
	}
	Arc::new(
		builder
			.fallback(Arc::new(MockLLM::new()), ProviderConfig::for_model("mock"))
			.build(),
	)
}

fn orchestrator_with(
	gateway: Arc<LlmGateway>,
	store: Arc<InMemoryStore>,
	bus: Arc<EventBus>,
	places: Option<Arc<dyn PlacesClient>>,
) -> Orchestrator {
	let registry = Arc::new(AgentRegistry::new());
	register_default_agents(&registry).unwrap();
	let orchestrator = Orchestrator::new(registry, store, bus, gateway);
	match places {
		Some(places) => orchestrator.with_places(places),
		None => orchestrator,
	}
}

const SKELETON_RESPONSE: &str = r#"{
  "summary": "Two easy days in Lisbon.",
  "days": [
    {"day": 1, "location": "Belem", "nodes": [
      {"type": "attraction", "title": "Morning sight", "startTime": "09:00", "endTime": "11:00"},
      {"type": "meal", "title": "Lunch", "startTime": "12:00", "endTime": "13:00"}
    ]},
    {"day": 2, "location": "Alfama", "nodes": [
      {"type": "transport", "title": "Transfer", "startTime": "09:00", "endTime": "09:30"},
      {"type": "attraction", "title": "Castle", "startTime": "10:00", "endTime": "12:00"}
    ]}
  ]
}"#;

#[tokio::test]
async fn test_initial_generation_pipeline() {
	let doc = Itinerary::new("gen-1", "Lisbon", date("2026-05-01"), date("2026-05-02"));
	let store = Arc::new(InMemoryStore::new());
	store.create(&doc).await.unwrap();
	let bus = Arc::new(EventBus::new());

	let gateway = scripted(vec![
		(LlmTaskKind::SkeletonPlanning, vec![SKELETON_RESPONSE]),
		(
			LlmTaskKind::ActivityPopulation,
			vec![
				r#"{"updates":[{"id":"day1_node1","title":"Oceanario de Lisboa","locationName":"Oceanario de Lisboa","description":"World-class aquarium on the waterfront.","startTime":"09:00","endTime":"11:00","labels":["family"]}]}"#,
				r#"{"updates":[{"id":"day2_node2","title":"Sao Jorge Castle","locationName":"Castelo de Sao Jorge"}]}"#,
			],
		),
		(
			LlmTaskKind::MealPopulation,
			vec![r#"{"updates":[{"id":"day1_node2","title":"Time Out Market","locationName":"Time Out Market"}]}"#],
		),
		(
			LlmTaskKind::TransportPopulation,
			vec![r#"{"updates":[{"id":"day2_node1","title":"Tram 28 to Alfama"}]}"#],
		),
	]);

	let places: Arc<dyn PlacesClient> = Arc::new(MockPlaces::new().with_place(
		"oceanario de lisboa",
		PlaceInfo {
			place_id: "pl-ocean".to_string(),
			name: "Oceanario de Lisboa".to_string(),
			address: Some("Esplanada Dom Carlos I".to_string()),
			coordinates: None,
			rating: Some(4.7),
			website: Some("https://www.oceanario.pt".to_string()),
			opening_hours: vec!["Mon-Sun 10:00-19:00".to_string()],
		},
	));

	let orchestrator = orchestrator_with(gateway, store.clone(), bus.clone(), Some(places));
	let mut sub = bus.subscribe("gen-1");

	let result = orchestrator
		.execute("gen-1", TaskKind::Generate, json!({}), None)
		.await
		.unwrap();
	assert_eq!(result.status, RunStatus::Completed);

	let doc = store.get("gen-1").await.unwrap();
	assert_eq!(doc.status, ItineraryStatus::Ready);
	assert_eq!(doc.summary.as_deref(), Some("Two easy days in Lisbon."));

	// The skeleton's ID contract held through population.
	let sight = doc.find_node("day1_node1").unwrap();
	assert_eq!(sight.title, "Oceanario de Lisboa");
	assert!(sight.labels.contains(&"family".to_string()));
	assert_eq!(doc.find_node("day1_node2").unwrap().title, "Time Out Market");
	assert_eq!(doc.find_node("day2_node1").unwrap().title, "Tram 28 to Alfama");
	assert_eq!(doc.find_node("day2_node2").unwrap().title, "Sao Jorge Castle");

	// Enrichment attached the place identity and links.
	let location = sight.location.as_ref().unwrap();
	assert_eq!(location.place_id.as_deref(), Some("pl-ocean"));
	assert!(sight.links.contains(&"https://www.oceanario.pt".to_string()));

	// Agent bookkeeping landed in agentData.
	assert!(doc.agent_data.contains_key("skeleton_planner"));
	assert!(doc.agent_data.contains_key("activity_agent"));
	assert!(doc.agent_data.contains_key("enrichment_agent"));

	wayfarer::engine::verify_invariants(&doc).unwrap();

	// Lifecycle events: every agent ran and succeeded, progress reached 100.
	let mut events = Vec::new();
	while let Ok(event) = sub.rx.try_recv() {
		events.push(event);
	}
	assert_eq!(events[0].agent_id, "skeleton_planner");
	assert_eq!(events[0].status, AgentStatus::Running);
	let succeeded = events.iter().filter(|e| e.status == AgentStatus::Succeeded).count();
	assert_eq!(succeeded, 5);
	assert!(events.iter().all(|e| e.itinerary_id == "gen-1"));
	assert_eq!(
		events.iter().filter_map(|e| e.progress).max(),
		Some(100)
	);
}

fn seeded_trip(id: &str) -> Itinerary {
	let mut doc = Itinerary::new(id, "Lisbon", date("2026-05-01"), date("2026-05-02"));
	{
		let day = doc.day_mut(1).unwrap();
		for title in ["a", "b"] {
			let nid = wayfarer::ids::allocate_in(day);
			day.nodes.push(wayfarer::models::itinerary::Node {
				id: nid,
				node_type: NodeType::Attraction,
				title: title.to_string(),
				location: None,
				start_time: None,
				end_time: None,
				cost: None,
				labels: vec![],
				tips: vec![],
				links: vec![],
				booking_ref: None,
				locked: false,
				status: wayfarer::models::itinerary::NodeStatus::Planned,
				updated_by: None,
				updated_at: 0,
			});
		}
	}
	doc
}

const INTENT_RESPONSE: &str =
	r#"{"action":"add_node","day":1,"nodeIds":[],"details":"add a museum on day 1"}"#;

const EDIT_RESPONSE: &str = r#"{
  "scope": "day",
  "day": 1,
  "preferences": {"userFirst": true, "respectLocks": true, "preserveTiming": true},
  "ops": [
    {"op": "insert", "after": null, "day": 1,
     "node": {"type": "attraction", "title": "Museum", "startTime": "13:30", "endTime": "15:30"}}
  ]
}"#;

#[tokio::test]
async fn test_chat_edit_applies_changeset() {
	let doc = seeded_trip("chat-1");
	let store = Arc::new(InMemoryStore::new());
	store.create(&doc).await.unwrap();
	let bus = Arc::new(EventBus::new());
	let gateway = scripted(vec![
		(LlmTaskKind::IntentClassification, vec![INTENT_RESPONSE]),
		(LlmTaskKind::ChangeSetGeneration, vec![EDIT_RESPONSE]),
	]);
	let orchestrator = orchestrator_with(gateway, store.clone(), bus, None);

	let response = orchestrator
		.chat(ChatRequest {
			itinerary_id: "chat-1".to_string(),
			message: "add a museum to day 1 in the afternoon".to_string(),
			user_id: Some("u-1".to_string()),
			deadline_ms: None,
			propose: false,
		})
		.await
		.unwrap();

	assert_eq!(response.status, RunStatus::Completed);
	let diff = response.diff.unwrap();
	assert_eq!(diff.added, vec!["day1_node3"]);
	assert!(response
		.messages
		.iter()
		.any(|m| m.text.contains("updated your itinerary")));

	let doc = store.get("chat-1").await.unwrap();
	let museum = doc.find_node("day1_node3").unwrap();
	assert_eq!(museum.title, "Museum");
	// Chat edits carry user provenance.
	assert_eq!(museum.updated_by.as_deref(), Some("user"));
	// The classifier's intent landed in agentData on the way through.
	assert!(doc.agent_data.contains_key("intent_classifier"));
}

#[tokio::test]
async fn test_chat_propose_leaves_document_untouched() {
	let doc = seeded_trip("chat-2");
	let store = Arc::new(InMemoryStore::new());
	store.create(&doc).await.unwrap();
	let bus = Arc::new(EventBus::new());
	let gateway = scripted(vec![
		(LlmTaskKind::IntentClassification, vec![INTENT_RESPONSE]),
		(LlmTaskKind::ChangeSetGeneration, vec![EDIT_RESPONSE]),
	]);
	let orchestrator = orchestrator_with(gateway, store.clone(), bus, None);

	let response = orchestrator
		.chat(ChatRequest {
			itinerary_id: "chat-2".to_string(),
			message: "what would adding a museum look like?".to_string(),
			user_id: None,
			deadline_ms: None,
			propose: true,
		})
		.await
		.unwrap();

	let diff = response.diff.unwrap();
	assert_eq!(diff.added, vec!["day1_node3"]);
	assert_eq!(diff.to_version, diff.from_version);
	assert_eq!(diff.preview_version, diff.from_version + 1);
	assert!(response.messages.iter().any(|m| m.text.contains("would change")));

	// Nothing was applied.
	let doc = store.get("chat-2").await.unwrap();
	assert!(doc.find_node("day1_node3").is_none());
}

#[tokio::test]
async fn test_chat_edit_with_invented_id_surfaces_valid_ids() {
	let doc = seeded_trip("chat-3");
	let store = Arc::new(InMemoryStore::new());
	store.create(&doc).await.unwrap();
	let bus = Arc::new(EventBus::new());
	let bad_edit = r#"{
	  "scope": "day",
	  "day": 1,
	  "preferences": {"userFirst": true, "respectLocks": true, "preserveTiming": false},
	  "ops": [{"op": "replace", "id": "day1_node9", "node": {"title": "ghost"}}]
	}"#;
	let gateway = scripted(vec![
		(LlmTaskKind::IntentClassification, vec![INTENT_RESPONSE]),
		(LlmTaskKind::ChangeSetGeneration, vec![bad_edit]),
	]);
	let orchestrator = orchestrator_with(gateway, store.clone(), bus, None);

	let response = orchestrator
		.chat(ChatRequest {
			itinerary_id: "chat-3".to_string(),
			message: "tweak that ghost stop".to_string(),
			user_id: None,
			deadline_ms: None,
			propose: false,
		})
		.await
		.unwrap();

	assert!(matches!(response.op_statuses[0].outcome, OpOutcome::Failed { .. }));
	let not_found = response
		.messages
		.iter()
		.find(|m| m.text.contains("not found"))
		.expect("failure message surfaced to the user");
	assert!(not_found.text.contains("day1_node1, day1_node2"));
}

#[tokio::test]
async fn test_required_agent_failure_aborts_plan() {
	let doc = seeded_trip("fail-1");
	let store = Arc::new(InMemoryStore::new());
	store.create(&doc).await.unwrap();
	let bus = Arc::new(EventBus::new());
	// The editor gets an unparseable response: SchemaMismatch, fatal for
	// that invocation, and the editor is a required agent.
	let gateway = scripted(vec![
		(LlmTaskKind::IntentClassification, vec![INTENT_RESPONSE]),
		(LlmTaskKind::ChangeSetGeneration, vec!["this is not json"]),
	]);
	let orchestrator = orchestrator_with(gateway, store.clone(), bus.clone(), None);
	let mut sub = bus.subscribe("fail-1");

	let err = orchestrator
		.chat(ChatRequest {
			itinerary_id: "fail-1".to_string(),
			message: "do something".to_string(),
			user_id: None,
			deadline_ms: None,
			propose: false,
		})
		.await
		.unwrap_err();
	assert!(matches!(err, CoreError::AgentFailed { .. }));

	let mut saw_editor_failure = false;
	while let Ok(event) = sub.rx.try_recv() {
		if event.agent_id == "editor_agent" && event.status == AgentStatus::Failed {
			saw_editor_failure = true;
		}
	}
	assert!(saw_editor_failure);
}

/// An agent that sleeps long enough for deadline/cancellation tests.
struct SlowAgent;

#[async_trait]
impl Agent for SlowAgent {
	fn name(&self) -> String {
		"slow_agent".to_string()
	}

	fn supported_tasks(&self) -> Vec<TaskKind> {
		vec![TaskKind::Enrich]
	}

	async fn execute(&self, _ctx: &AgentContext, _itinerary: &Itinerary) -> wayfarer::CoreResult<AgentOutput> {
		tokio::time::sleep(Duration::from_secs(5)).await;
		Ok(AgentOutput::empty())
	}
}

#[tokio::test]
async fn test_deadline_exhaustion_returns_partial() {
	let doc = seeded_trip("slow-1");
	let store = Arc::new(InMemoryStore::new());
	store.create(&doc).await.unwrap();
	let bus = Arc::new(EventBus::new());
	let registry = Arc::new(AgentRegistry::new());
	registry.register(Arc::new(SlowAgent)).unwrap();
	let gateway = scripted(vec![]);
	let orchestrator = Orchestrator::new(registry, store.clone(), bus, gateway);

	let before_version = store.get("slow-1").await.unwrap().version;
	let result = orchestrator
		.execute(
			"slow-1",
			TaskKind::Enrich,
			json!({}),
			Some(Duration::from_millis(100)),
		)
		.await
		.unwrap();

	assert_eq!(result.status, RunStatus::Partial);
	// The latest committed version is reported; nothing partial persisted.
	assert_eq!(result.version, before_version);
}

#[tokio::test]
async fn test_cancellation_emits_single_failed_event() {
	let doc = seeded_trip("cancel-1");
	let store = Arc::new(InMemoryStore::new());
	store.create(&doc).await.unwrap();
	let bus = Arc::new(EventBus::new());
	let registry = Arc::new(AgentRegistry::new());
	registry.register(Arc::new(SlowAgent)).unwrap();
	let gateway = scripted(vec![]);
	let orchestrator = Arc::new(Orchestrator::new(registry, store, bus.clone(), gateway));

	let (handle, token) = cancel_pair();
	let mut sub = bus.subscribe("cancel-1");

	let run = {
		let orchestrator = Arc::clone(&orchestrator);
		tokio::spawn(async move {
			orchestrator
				.execute_with("cancel-1", TaskKind::Enrich, json!({}), None, token)
				.await
		})
	};

	tokio::time::sleep(Duration::from_millis(50)).await;
	handle.cancel();
	let result = run.await.unwrap();
	assert!(matches!(result, Err(CoreError::Cancelled)));

	let mut cancelled_events = 0;
	while let Ok(event) = sub.rx.try_recv() {
		if event.status == AgentStatus::Failed
			&& event.message.as_deref() == Some("cancelled")
		{
			cancelled_events += 1;
		}
	}
	assert_eq!(cancelled_events, 1);
}

/// Delegating store that fails the first put with a version conflict, the
/// way a concurrent writer in another process would.
struct FlakyStore {
	inner: InMemoryStore,
	tripped: AtomicBool,
}

#[async_trait]
impl DocumentStore for FlakyStore {
	async fn get(&self, itinerary_id: &str) -> wayfarer::CoreResult<Itinerary> {
		self.inner.get(itinerary_id).await
	}

	async fn put(&self, doc: &Itinerary, expected_version: u64) -> wayfarer::CoreResult<()> {
		if !self.tripped.swap(true, Ordering::SeqCst) {
			return Err(CoreError::VersionConflict {
				expected: expected_version,
				actual: expected_version + 1,
			});
		}
		self.inner.put(doc, expected_version).await
	}

	async fn get_at_version(&self, itinerary_id: &str, version: u64) -> wayfarer::CoreResult<Itinerary> {
		self.inner.get_at_version(itinerary_id, version).await
	}

	async fn create(&self, doc: &Itinerary) -> wayfarer::CoreResult<()> {
		self.inner.create(doc).await
	}
}

/// An agent that emits one fixed insert, no LLM involved.
struct InsertAgent;

#[async_trait]
impl Agent for InsertAgent {
	fn name(&self) -> String {
		"insert_agent".to_string()
	}

	fn supported_tasks(&self) -> Vec<TaskKind> {
		vec![TaskKind::Enrich]
	}

	async fn execute(&self, _ctx: &AgentContext, _itinerary: &Itinerary) -> wayfarer::CoreResult<AgentOutput> {
		Ok(AgentOutput::with_changes(ChangeSet::trip(vec![
			ChangeOp::Insert {
				after: None,
				day: Some(1),
				node: NodeDraft {
					title: "retried insert".to_string(),
					..NodeDraft::default()
				},
			},
		])))
	}
}

#[tokio::test]
async fn test_version_conflict_is_retried() {
	let doc = seeded_trip("retry-1");
	let store = Arc::new(FlakyStore {
		inner: InMemoryStore::new(),
		tripped: AtomicBool::new(false),
	});
	store.create(&doc).await.unwrap();
	let bus = Arc::new(EventBus::new());
	let registry = Arc::new(AgentRegistry::new());
	registry.register(Arc::new(InsertAgent)).unwrap();
	let gateway = scripted(vec![]);
	let orchestrator = Orchestrator::new(registry, store.clone(), bus, gateway);

	let result = orchestrator
		.execute("retry-1", TaskKind::Enrich, json!({}), None)
		.await
		.unwrap();
	assert_eq!(result.status, RunStatus::Completed);

	let doc = store.get("retry-1").await.unwrap();
	assert!(doc.find_node("day1_node3").is_some());
}
