//! Transport-neutral request dispatcher.
//!
//! The transport layer authenticates the caller, extracts the task id from
//! the path and hands over the JSON body. [`MarketplaceApi::handle`] runs the
//! operation and returns the status code and JSON body to send back. Errors
//! are rendered as:
//!
//! ```json
//! {"error": {"kind": "state_conflict", "message": "...", "retry_safe": true}}
//! ```
//!
//! Divergence errors additionally carry a `divergence` object with the task,
//! escrow, operation, reference and amount involved.

use crate::context::MarketplaceContext;
use crate::settlement::ports::EscrowGateway;
use crate::task::{
    domain::{Milestone, ProjectId, TaskId, TaskStatus, UserId, Visibility},
    ports::{TaskFilter, TaskStore},
    services::{
        CreateTaskRequest, DivergenceReport, ErrorKind, MarketplaceError, RetrySafety,
        SubmitWorkRequest,
    },
};
use mockable::Clock;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};
use thiserror::Error;

/// Operations exposed to callers, with the path task id where one applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Create and fund a task. Body: [`CreateTaskBody`].
    CreateTask,
    /// List tasks. Body: [`ListTasksBody`].
    ListTasks,
    /// Read a task with its submissions and visible bids.
    GetTask(TaskId),
    /// Bid on a task. Body: [`SubmitBidBody`].
    SubmitBid(TaskId),
    /// Select the executor. Body: [`SelectBidderBody`].
    SelectBidder(TaskId),
    /// Submit milestone work. Body: [`SubmitWorkBody`].
    SubmitWork(TaskId),
    /// Approve a milestone and release its payment. Body: [`MilestoneBody`].
    ApproveMilestone(TaskId),
    /// Reject a milestone submission. Body: [`RejectMilestoneBody`].
    RejectMilestone(TaskId),
    /// Cancel a task and refund the remainder.
    CancelTask(TaskId),
    /// Read the caller's token balance.
    GetBalance,
}

impl Operation {
    /// Returns a stable operation name for logs.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::CreateTask => "create_task",
            Self::ListTasks => "list_tasks",
            Self::GetTask(_) => "get_task",
            Self::SubmitBid(_) => "submit_bid",
            Self::SelectBidder(_) => "select_bidder",
            Self::SubmitWork(_) => "submit_work",
            Self::ApproveMilestone(_) => "approve_milestone",
            Self::RejectMilestone(_) => "reject_milestone",
            Self::CancelTask(_) => "cancel_task",
            Self::GetBalance => "get_balance",
        }
    }
}

/// A parsed request.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    /// Verified caller identity, if the transport authenticated one.
    pub caller: Option<UserId>,
    /// Requested operation.
    pub operation: Operation,
    /// JSON body; `null` when absent.
    pub body: Value,
}

impl ApiRequest {
    /// Creates a request without a body.
    #[must_use]
    pub const fn new(caller: Option<UserId>, operation: Operation) -> Self {
        Self {
            caller,
            operation,
            body: Value::Null,
        }
    }

    /// Attaches a JSON body.
    #[must_use]
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = body;
        self
    }
}

/// Status code and JSON body to return.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    /// HTTP-style status code.
    pub status: u16,
    /// JSON body.
    pub body: Value,
}

impl ApiResponse {
    /// Returns the error kind carried by an error body.
    #[must_use]
    pub fn error_kind(&self) -> Option<&str> {
        self.body.get("error")?.get("kind")?.as_str()
    }
}

/// Body of [`Operation::CreateTask`].
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateTaskBody {
    /// Task name.
    pub name: String,
    /// Reward in display units.
    pub reward: Decimal,
    /// Description.
    #[serde(default)]
    pub description: String,
    /// Acceptance criteria.
    #[serde(default)]
    pub acceptance_criteria: String,
    /// Visibility; global when omitted.
    #[serde(default)]
    pub visibility: Option<Visibility>,
    /// Owning project.
    #[serde(default)]
    pub project_id: Option<ProjectId>,
}

impl CreateTaskBody {
    fn into_request(self) -> CreateTaskRequest {
        let request = CreateTaskRequest::new(self.name, self.reward)
            .with_description(self.description)
            .with_acceptance_criteria(self.acceptance_criteria)
            .with_visibility(self.visibility.unwrap_or(Visibility::Global));
        match self.project_id {
            Some(project) => request.with_project(project),
            None => request,
        }
    }
}

/// Body of [`Operation::ListTasks`]; every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ListTasksBody {
    /// Visibility to match.
    pub visibility: Option<Visibility>,
    /// Project to match.
    pub project_id: Option<ProjectId>,
    /// Status to match.
    pub status: Option<TaskStatus>,
    /// Creator to match.
    pub creator: Option<UserId>,
    /// Executor to match.
    pub executor: Option<UserId>,
    /// Only tasks this user has bid on.
    pub bidder: Option<UserId>,
}

impl From<ListTasksBody> for TaskFilter {
    fn from(body: ListTasksBody) -> Self {
        Self {
            visibility: body.visibility,
            project_id: body.project_id,
            status: body.status,
            creator: body.creator,
            executor: body.executor,
            bidder: body.bidder,
        }
    }
}

/// Body of [`Operation::SubmitBid`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SubmitBidBody {
    /// Proposal text.
    pub message: String,
}

/// Body of [`Operation::SelectBidder`].
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SelectBidderBody {
    /// Bidder to select.
    pub bidder: UserId,
}

/// Body of [`Operation::SubmitWork`].
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubmitWorkBody {
    /// Milestone the work is for.
    pub milestone: Milestone,
    /// Submitted content.
    pub content: String,
    /// Attachment references.
    #[serde(default)]
    pub attachments: Vec<String>,
}

/// Body of [`Operation::ApproveMilestone`].
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MilestoneBody {
    /// Milestone reviewed.
    pub milestone: Milestone,
}

/// Body of [`Operation::RejectMilestone`].
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RejectMilestoneBody {
    /// Milestone reviewed.
    pub milestone: Milestone,
    /// Feedback for the executor.
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Error)]
enum ApiError {
    #[error("request carries no caller identity")]
    Unauthenticated,

    #[error("invalid request body: {0}")]
    InvalidBody(#[source] serde_json::Error),

    #[error(transparent)]
    Service(#[from] MarketplaceError),

    #[error("failed to encode response: {0}")]
    Encoding(#[source] serde_json::Error),
}

impl ApiError {
    const fn kind(&self) -> ErrorKind {
        match self {
            Self::Unauthenticated => ErrorKind::Unauthorized,
            Self::InvalidBody(_) => ErrorKind::ValidationError,
            Self::Service(err) => err.kind(),
            Self::Encoding(_) => ErrorKind::Internal,
        }
    }

    fn into_response(self) -> ApiResponse {
        let kind = self.kind();
        let retry_safe = match &self {
            Self::Service(err) => matches!(err.retry_safety(), RetrySafety::Safe),
            Self::Unauthenticated | Self::InvalidBody(_) | Self::Encoding(_) => true,
        };
        let mut error = Map::new();
        error.insert("kind".to_owned(), Value::from(kind.as_str()));
        error.insert("message".to_owned(), Value::from(self.to_string()));
        error.insert("retry_safe".to_owned(), Value::from(retry_safe));
        if let Some(report) = self.divergence()
            && let Ok(details) = serde_json::to_value(report)
        {
            error.insert("divergence".to_owned(), details);
        }
        let mut body = Map::new();
        body.insert("error".to_owned(), Value::Object(error));
        ApiResponse {
            status: status_code(kind),
            body: Value::Object(body),
        }
    }

    fn divergence(&self) -> Option<&DivergenceReport> {
        match self {
            Self::Service(err) => err.divergence(),
            Self::Unauthenticated | Self::InvalidBody(_) | Self::Encoding(_) => None,
        }
    }
}

/// Maps an error kind to its status code.
#[must_use]
pub const fn status_code(kind: ErrorKind) -> u16 {
    match kind {
        ErrorKind::ValidationError | ErrorKind::InsufficientFunds => 400,
        ErrorKind::Unauthorized => 401,
        ErrorKind::Forbidden | ErrorKind::InsufficientReputation => 403,
        ErrorKind::NotFound => 404,
        ErrorKind::StateConflict => 409,
        ErrorKind::LedgerFailure => 502,
        ErrorKind::Divergence | ErrorKind::Internal => 500,
    }
}

const OK: u16 = 200;
const CREATED: u16 = 201;

/// Dispatches parsed requests to the marketplace services.
#[derive(Clone)]
pub struct MarketplaceApi<S, G, C>
where
    S: TaskStore,
    G: EscrowGateway,
    C: Clock + Send + Sync,
{
    context: MarketplaceContext<S, G, C>,
}

impl<S, G, C> MarketplaceApi<S, G, C>
where
    S: TaskStore,
    G: EscrowGateway,
    C: Clock + Send + Sync,
{
    /// Creates a dispatcher over `context`.
    #[must_use]
    pub const fn new(context: MarketplaceContext<S, G, C>) -> Self {
        Self { context }
    }

    /// Returns the wired services.
    #[must_use]
    pub const fn context(&self) -> &MarketplaceContext<S, G, C> {
        &self.context
    }

    /// Runs one request and renders its outcome.
    pub async fn handle(&self, request: ApiRequest) -> ApiResponse {
        let operation = request.operation;
        match self.dispatch(request).await {
            Ok(response) => response,
            Err(err) => {
                let response = err.into_response();
                if response.status >= 500 {
                    tracing::warn!(
                        operation = operation.name(),
                        status = response.status,
                        "request failed"
                    );
                } else {
                    tracing::debug!(
                        operation = operation.name(),
                        status = response.status,
                        "request rejected"
                    );
                }
                response
            }
        }
    }

    async fn dispatch(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
        let caller = request.caller.ok_or(ApiError::Unauthenticated)?;
        let lifecycle = &self.context.lifecycle;
        let bidding = &self.context.bidding;
        match request.operation {
            Operation::CreateTask => {
                let body: CreateTaskBody = parse_body(request.body)?;
                let created = lifecycle.create_task(&caller, body.into_request()).await?;
                respond(CREATED, &created)
            }
            Operation::ListTasks => {
                let body: ListTasksBody = parse_body(request.body)?;
                let tasks = lifecycle.list_tasks(&body.into()).await?;
                respond(OK, &tasks)
            }
            Operation::GetTask(task_id) => {
                respond(OK, &lifecycle.get_task(&caller, task_id).await?)
            }
            Operation::SubmitBid(task_id) => {
                let body: SubmitBidBody = parse_body(request.body)?;
                let bid = bidding.submit_bid(&caller, task_id, &body.message).await?;
                respond(CREATED, &bid)
            }
            Operation::SelectBidder(task_id) => {
                let body: SelectBidderBody = parse_body(request.body)?;
                let selected = bidding
                    .select_bidder(&caller, task_id, &body.bidder)
                    .await?;
                respond(OK, &selected)
            }
            Operation::SubmitWork(task_id) => {
                let body: SubmitWorkBody = parse_body(request.body)?;
                let work = SubmitWorkRequest::new(body.milestone, body.content)
                    .with_attachments(body.attachments);
                respond(
                    CREATED,
                    &lifecycle.submit_work(&caller, task_id, work).await?,
                )
            }
            Operation::ApproveMilestone(task_id) => {
                let body: MilestoneBody = parse_body(request.body)?;
                let approved = lifecycle
                    .approve_milestone(&caller, task_id, body.milestone)
                    .await?;
                respond(OK, &approved)
            }
            Operation::RejectMilestone(task_id) => {
                let body: RejectMilestoneBody = parse_body(request.body)?;
                let rejected = lifecycle
                    .reject_milestone(&caller, task_id, body.milestone, &body.reason)
                    .await?;
                respond(OK, &rejected)
            }
            Operation::CancelTask(task_id) => {
                respond(OK, &lifecycle.cancel_task(&caller, task_id).await?)
            }
            Operation::GetBalance => respond(OK, &lifecycle.get_balance(&caller).await?),
        }
    }
}

fn parse_body<T: DeserializeOwned>(body: Value) -> Result<T, ApiError> {
    let object = if body.is_null() {
        Value::Object(Map::new())
    } else {
        body
    };
    serde_json::from_value(object).map_err(ApiError::InvalidBody)
}

fn respond<T: Serialize>(status: u16, payload: &T) -> Result<ApiResponse, ApiError> {
    let body = serde_json::to_value(payload).map_err(ApiError::Encoding)?;
    Ok(ApiResponse { status, body })
}
