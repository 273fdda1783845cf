//! Unit-of-work executor with saga compensation.
//!
//! Drains the task graph in dependency order, retries failed invocations
//! with exponential backoff, and on terminal failure runs the compensation
//! tasks in strict reverse order. Runtime state lives in a per-run table
//! keyed by task ID and is written back to the `UnitOfWork` when the run
//! finishes, so shared `Task` values are never mutated mid-flight.

use chrono::Utc;
use convoy_core::{
    ErrorResponse, ExecutionError, ExecutionResult, JourneyStage, ProtocolMessage, RetryConfig,
    Task, TaskStatus, Timestamp, UnitOfWork, WorkStatus,
};
use convoy_protocol::{AgentHandler, ProtocolBroker};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, error, info, warn};

// ============================================================================
// AGENT INVOKER SEAM
// ============================================================================

/// Performs one agent invocation for a task.
///
/// `task_results` holds the payloads of already-completed tasks, keyed by
/// task ID, so an invocation can consume its dependencies' outputs. Errors
/// are plain strings; the executor owns retry policy.
pub trait AgentInvoker: Send + Sync {
    fn invoke(&self, task: &Task, task_results: &HashMap<String, Value>)
        -> Result<Value, String>;
}

// ============================================================================
// TASK RUNTIME STATE
// ============================================================================

/// Per-run mutable state for one task.
#[derive(Debug, Clone)]
struct TaskRun {
    status: TaskStatus,
    retry_count: u32,
    error: Option<String>,
    result: Option<Value>,
    started_at: Option<Timestamp>,
    completed_at: Option<Timestamp>,
}

impl TaskRun {
    fn pending() -> Self {
        Self {
            status: TaskStatus::Pending,
            retry_count: 0,
            error: None,
            result: None,
            started_at: None,
            completed_at: None,
        }
    }
}

/// Runtime table for one execution: task state plus accumulated results.
struct RunState {
    runs: HashMap<String, TaskRun>,
    task_results: HashMap<String, Value>,
}

impl RunState {
    fn new(uow: &UnitOfWork) -> Self {
        Self {
            runs: uow
                .tasks
                .iter()
                .map(|t| (t.task_id.clone(), TaskRun::pending()))
                .collect(),
            task_results: HashMap::new(),
        }
    }

    /// Pending tasks whose dependencies have all completed, in declaration
    /// order.
    fn runnable<'a>(&self, uow: &'a UnitOfWork) -> Vec<&'a Task> {
        let completed: HashSet<&str> = self
            .runs
            .iter()
            .filter(|(_, run)| run.status == TaskStatus::Completed)
            .map(|(id, _)| id.as_str())
            .collect();

        uow.tasks
            .iter()
            .filter(|t| self.runs[&t.task_id].status == TaskStatus::Pending)
            .filter(|t| t.depends_on.iter().all(|d| completed.contains(d.as_str())))
            .collect()
    }

    fn pending_count(&self) -> usize {
        self.runs
            .values()
            .filter(|run| run.status == TaskStatus::Pending)
            .count()
    }
}

// ============================================================================
// EXECUTION METRICS
// ============================================================================

/// Metrics for one completed unit-of-work run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionMetrics {
    pub work_id: String,
    pub stage: JourneyStage,
    pub client_id: String,
    pub status: WorkStatus,
    pub task_count: usize,
    pub completed_count: usize,
    pub failed_count: usize,
    pub duration_seconds: Option<f64>,
    pub compensation_executed: bool,
    pub recorded_at: Timestamp,
}

// ============================================================================
// EXECUTOR
// ============================================================================

/// Executes units of work against an injected [`AgentInvoker`].
///
/// The metrics lock is never held across an `invoke` call; two different
/// units of work may execute concurrently on separate threads.
pub struct UnitOfWorkExecutor {
    invoker: Arc<dyn AgentInvoker>,
    retry: RetryConfig,
    metrics: RwLock<HashMap<String, ExecutionMetrics>>,
}

impl UnitOfWorkExecutor {
    pub fn new(invoker: Arc<dyn AgentInvoker>, retry: RetryConfig) -> Self {
        Self {
            invoker,
            retry,
            metrics: RwLock::new(HashMap::new()),
        }
    }

    /// Execute a unit of work to completion.
    ///
    /// Returns `Err` only for pre-execution rejection (dependency cycle);
    /// task failures are reported inside the [`ExecutionResult`]. Final task
    /// statuses and timings are written back onto `uow`.
    pub fn execute(&self, uow: &mut UnitOfWork) -> Result<ExecutionResult, ExecutionError> {
        if uow.has_circular_dependencies() {
            return Err(ExecutionError::DependencyCycle {
                work_id: uow.work_id.clone(),
            });
        }

        uow.status = WorkStatus::InProgress;
        uow.started_at = Some(Utc::now());
        info!(
            work_id = %uow.work_id,
            task_count = uow.tasks.len(),
            "starting unit of work"
        );

        let mut state = RunState::new(uow);
        let mut completed_tasks: Vec<String> = Vec::new();
        let mut failed_tasks: Vec<String> = Vec::new();
        let mut compensation_executed = false;

        'drain: loop {
            let runnable: Vec<Task> = state.runnable(uow).into_iter().cloned().collect();
            if runnable.is_empty() {
                let pending = state.pending_count();
                if pending > 0 {
                    // Blocked by a failed dependency; nothing can progress.
                    warn!(
                        work_id = %uow.work_id,
                        pending,
                        "no runnable tasks with work still pending"
                    );
                }
                break;
            }

            for task in &runnable {
                if self.execute_task(task, &mut state, &uow.work_id) {
                    completed_tasks.push(task.task_id.clone());
                } else {
                    failed_tasks.push(task.task_id.clone());
                    uow.failed_task_id = Some(task.task_id.clone());

                    if !uow.compensation_tasks.is_empty() {
                        info!(
                            work_id = %uow.work_id,
                            failed_task = %task.task_id,
                            "task failed, initiating compensation"
                        );
                        uow.status = WorkStatus::Compensating;
                        self.execute_compensation(uow, &state.task_results);
                        compensation_executed = true;
                        break 'drain;
                    }
                }
            }
        }

        // Tasks blocked by a failure never ran.
        for run in state.runs.values_mut() {
            if run.status == TaskStatus::Pending {
                run.status = TaskStatus::Skipped;
            }
        }

        uow.status = if compensation_executed {
            WorkStatus::Compensated
        } else if failed_tasks.is_empty() {
            WorkStatus::Completed
        } else {
            WorkStatus::Failed
        };
        uow.completed_at = Some(Utc::now());
        self.write_back(uow, &state);

        let duration_seconds = uow.execution_duration().map(|d| d.as_secs_f64());
        self.record_metrics(uow, completed_tasks.len(), failed_tasks.len(), duration_seconds);

        info!(
            work_id = %uow.work_id,
            status = %uow.status,
            completed = completed_tasks.len(),
            failed = failed_tasks.len(),
            "unit of work finished"
        );

        Ok(ExecutionResult {
            success: uow.status == WorkStatus::Completed,
            work_id: uow.work_id.clone(),
            status: uow.status,
            completed_tasks,
            failed_tasks,
            task_results: state.task_results,
            error: uow
                .failed_task_id
                .as_ref()
                .and_then(|id| state.runs.get(id))
                .and_then(|run| run.error.clone()),
            duration_seconds,
            compensation_executed,
        })
    }

    /// Run one task with retries. Returns true on success.
    ///
    /// A task gets `max_retries` attempts in total, with exponential
    /// backoff between them.
    fn execute_task(&self, task: &Task, state: &mut RunState, work_id: &str) -> bool {
        let max_attempts = task.max_retries.max(1);
        let run = state.runs.get_mut(&task.task_id).unwrap();
        run.status = TaskStatus::InProgress;
        run.started_at = Some(Utc::now());

        debug!(
            work_id = %work_id,
            task_id = %task.task_id,
            agent_id = %task.agent_id,
            intent = %task.intent,
            "executing task"
        );

        for attempt in 1..=max_attempts {
            if attempt > 1 {
                std::thread::sleep(self.retry.backoff_for_attempt(attempt));
            }

            match self.invoker.invoke(task, &state.task_results) {
                Ok(result) => {
                    let run = state.runs.get_mut(&task.task_id).unwrap();
                    run.status = TaskStatus::Completed;
                    run.completed_at = Some(Utc::now());
                    run.result = Some(result.clone());
                    state.task_results.insert(task.task_id.clone(), result);
                    debug!(work_id = %work_id, task_id = %task.task_id, "task completed");
                    return true;
                }
                Err(e) => {
                    let run = state.runs.get_mut(&task.task_id).unwrap();
                    run.retry_count = attempt;
                    run.error = Some(e.clone());
                    if attempt < max_attempts {
                        warn!(
                            work_id = %work_id,
                            task_id = %task.task_id,
                            attempt,
                            max_attempts,
                            error = %e,
                            "task failed, retrying"
                        );
                    } else {
                        error!(
                            work_id = %work_id,
                            task_id = %task.task_id,
                            attempts = max_attempts,
                            error = %e,
                            "task failed, retries exhausted"
                        );
                    }
                }
            }
        }

        let run = state.runs.get_mut(&task.task_id).unwrap();
        run.status = TaskStatus::Failed;
        run.completed_at = Some(Utc::now());
        false
    }

    /// Run compensation tasks in strict reverse declaration order.
    ///
    /// Compensation failures are logged and do not stop the remaining
    /// compensation tasks; operators remediate from the log.
    fn execute_compensation(&self, uow: &mut UnitOfWork, task_results: &HashMap<String, Value>) {
        info!(
            work_id = %uow.work_id,
            compensation_task_count = uow.compensation_tasks.len(),
            "executing compensation"
        );

        for comp_task in uow.compensation_tasks.iter_mut().rev() {
            comp_task.status = TaskStatus::InProgress;
            comp_task.started_at = Some(Utc::now());

            match self.invoker.invoke(comp_task, task_results) {
                Ok(result) => {
                    comp_task.status = TaskStatus::Completed;
                    comp_task.completed_at = Some(Utc::now());
                    comp_task.result = Some(result);
                    info!(
                        work_id = %uow.work_id,
                        task_id = %comp_task.task_id,
                        "compensation task completed"
                    );
                }
                Err(e) => {
                    comp_task.status = TaskStatus::Failed;
                    comp_task.error = Some(e.clone());
                    comp_task.completed_at = Some(Utc::now());
                    error!(
                        work_id = %uow.work_id,
                        task_id = %comp_task.task_id,
                        error = %e,
                        "compensation task failed"
                    );
                }
            }
        }
    }

    /// Copy final runtime state onto the unit of work's tasks.
    fn write_back(&self, uow: &mut UnitOfWork, state: &RunState) {
        for task in &mut uow.tasks {
            if let Some(run) = state.runs.get(&task.task_id) {
                task.status = run.status;
                task.retry_count = run.retry_count;
                task.error = run.error.clone();
                task.result = run.result.clone();
                task.started_at = run.started_at;
                task.completed_at = run.completed_at;
            }
        }
    }

    fn record_metrics(
        &self,
        uow: &UnitOfWork,
        completed_count: usize,
        failed_count: usize,
        duration_seconds: Option<f64>,
    ) {
        let metrics = ExecutionMetrics {
            work_id: uow.work_id.clone(),
            stage: uow.stage,
            client_id: uow.client_id.clone(),
            status: uow.status,
            task_count: uow.tasks.len(),
            completed_count,
            failed_count,
            duration_seconds,
            compensation_executed: uow.status == WorkStatus::Compensated,
            recorded_at: Utc::now(),
        };
        self.metrics
            .write()
            .unwrap()
            .insert(uow.work_id.clone(), metrics);
    }

    pub fn metrics(&self, work_id: &str) -> Option<ExecutionMetrics> {
        self.metrics.read().unwrap().get(work_id).cloned()
    }

    pub fn all_metrics(&self) -> Vec<ExecutionMetrics> {
        self.metrics.read().unwrap().values().cloned().collect()
    }
}

// ============================================================================
// BROKER INVOKER
// ============================================================================

/// Production invoker: drives each task through the protocol broker.
///
/// Per task it negotiates a handshake with the task's agent, accepts it to
/// obtain a contract, and routes a contract-tagged request message carrying
/// the dependencies' results. The invoking side registers a capture handler
/// so the target's response lands back here.
pub struct BrokerInvoker {
    broker: Arc<ProtocolBroker>,
    /// Identity the invoker presents as the message source
    source: convoy_core::AgentRef,
    auth_token: String,
    responses: Arc<ResponseCapture>,
}

/// Collects responses addressed to the orchestrator.
#[derive(Default)]
pub struct ResponseCapture {
    responses: Mutex<Vec<ProtocolMessage>>,
}

impl ResponseCapture {
    /// Most recent response correlated to the given request.
    fn take_for(&self, correlation_id: &str) -> Option<ProtocolMessage> {
        let mut responses = self.responses.lock().unwrap();
        let idx = responses
            .iter()
            .rposition(|m| m.correlation_id() == Some(correlation_id))?;
        Some(responses.remove(idx))
    }
}

impl AgentHandler for ResponseCapture {
    fn on_message(&self, message: &ProtocolMessage) {
        self.responses.lock().unwrap().push(message.clone());
    }
}

impl BrokerInvoker {
    /// Wire an invoker to a broker, registering the orchestrator identity
    /// as a routable agent so task responses can be delivered back.
    pub fn new(
        broker: Arc<ProtocolBroker>,
        source: convoy_core::AgentRef,
        auth_token: impl Into<String>,
    ) -> Self {
        let responses = Arc::new(ResponseCapture::default());
        broker.register_agent(source.agent_id.clone(), responses.clone());
        Self {
            broker,
            source,
            auth_token: auth_token.into(),
            responses,
        }
    }
}

impl AgentInvoker for BrokerInvoker {
    fn invoke(
        &self,
        task: &Task,
        task_results: &HashMap<String, Value>,
    ) -> Result<Value, String> {
        // Negotiate a contract for this invocation.
        let handshake = self
            .broker
            .initiate_handshake(&self.source.agent_id, &task.agent_id, &task.intent);
        if !handshake.valid {
            return Err(handshake
                .error_message
                .unwrap_or_else(|| "handshake rejected".to_string()));
        }
        let handshake_id = handshake
            .detail_str("handshake_id")
            .ok_or("handshake accepted without an id")?
            .to_string();

        let accepted = self.broker.accept_handshake(&handshake_id);
        if !accepted.valid {
            return Err(accepted
                .error_message
                .unwrap_or_else(|| "handshake acceptance failed".to_string()));
        }
        let contract_id = accepted
            .detail_str("contract_id")
            .ok_or("contract created without an id")?
            .to_string();

        // Dependency outputs travel in the request payload.
        let mut input = Map::new();
        for dep_id in &task.depends_on {
            if let Some(result) = task_results.get(dep_id) {
                input.insert(dep_id.clone(), result.clone());
            }
        }

        let mut payload = Map::new();
        payload.insert("contract_id".to_string(), Value::from(contract_id));
        payload.insert("task_id".to_string(), Value::from(task.task_id.clone()));
        payload.insert("input".to_string(), Value::Object(input));

        let message = ProtocolMessage::new(
            self.source.clone(),
            convoy_core::AgentRef::new(&task.agent_id, "", ""),
            convoy_core::MessageKind::Request,
            payload,
            convoy_core::SecurityContext::new(&self.auth_token),
        )
        .with_intent(&task.intent);
        let message_id = message.message_id.to_string();

        let routed = self.broker.route_message(&message);
        if !routed.valid {
            return Err(routed
                .error_message
                .unwrap_or_else(|| "message routing failed".to_string()));
        }

        // Synchronous dispatch: the response, if any, has arrived by now.
        match self.responses.take_for(&message_id) {
            Some(response) if response.kind == convoy_core::MessageKind::Error => {
                let error: Option<ErrorResponse> = response
                    .payload
                    .get("error")
                    .and_then(|e| serde_json::from_value(e.clone()).ok());
                Err(error
                    .map(|e| e.message)
                    .unwrap_or_else(|| "agent returned an error".to_string()))
            }
            Some(response) => Ok(Value::Object(response.payload)),
            None => Ok(json!({ "status": "accepted", "task_id": task.task_id })),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
