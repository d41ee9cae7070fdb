use actix_web::{middleware, web, App, HttpResponse, HttpServer};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::config::SchedulerConfig;
use crate::error::ScheduleError;
use crate::schedule::{
    local_to_utc, utc_to_local_date, BookingRequest, CandidateQueueEntry, CapacityCounter,
    DateOverride, EngineState, Interview, InterviewStatus, InterviewType, SchedulerEngine, Slot,
    UrgencyLevel, WeeklyTemplate,
};

/// Shared application state: the engine owns everything behind its own locks.
pub struct AppState {
    pub engine: SchedulerEngine,
}

#[derive(Serialize)]
struct StatusResponse {
    engine_state: EngineState,
    capacity: CapacityCounter,
    queue_length: usize,
    queue_by_urgency: BTreeMap<UrgencyLevel, usize>,
}

#[derive(Deserialize)]
struct CalendarQuery {
    start: NaiveDate,
    end: NaiveDate,
}

#[derive(Serialize)]
struct CalendarResponse {
    start: NaiveDate,
    end: NaiveDate,
    slots: Vec<Slot>,
    interviews: Vec<Interview>,
}

#[derive(Deserialize)]
struct AvailabilityUpdate {
    template: Option<WeeklyTemplate>,
    #[serde(rename = "override")]
    date_override: Option<DateOverride>,
}

#[derive(Deserialize)]
struct ScheduleRequestBody {
    /// Queue entry to transition once booked, when the candidate came
    /// through the funnel.
    candidate_id: Option<Uuid>,
    candidate_name: String,
    start: DateTime<Utc>,
    duration_minutes: Option<u32>,
    interview_type: Option<InterviewType>,
    notes: Option<String>,
    meeting_link: Option<String>,
}

#[derive(Deserialize)]
struct MoveRequestBody {
    start: DateTime<Utc>,
}

#[derive(Deserialize)]
struct StatusUpdateBody {
    status: InterviewStatus,
}

#[derive(Deserialize)]
struct EnqueueRequest {
    candidate_name: String,
    priority_score: f64,
    #[serde(default)]
    deadline: Option<DateTime<Utc>>,
}

/// Queue entry plus its urgency derived at response time.
#[derive(Serialize)]
struct QueueEntryView {
    #[serde(flatten)]
    entry: CandidateQueueEntry,
    urgency: UrgencyLevel,
}

impl QueueEntryView {
    fn new(entry: CandidateQueueEntry, as_of: DateTime<Utc>) -> Self {
        let urgency = entry.urgency(as_of);
        Self { entry, urgency }
    }
}

// --- engine control ---

async fn run_engine(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(state.engine.run(Utc::now()))
}

async fn emergency_stop(state: web::Data<AppState>) -> HttpResponse {
    let engine_state = state.engine.emergency_stop();
    HttpResponse::Ok().json(serde_json::json!({ "engine_state": engine_state }))
}

async fn resume_engine(state: web::Data<AppState>) -> HttpResponse {
    let engine_state = state.engine.resume();
    HttpResponse::Ok().json(serde_json::json!({ "engine_state": engine_state }))
}

async fn get_status(state: web::Data<AppState>) -> HttpResponse {
    let now = Utc::now();
    let engine = &state.engine;
    let today = utc_to_local_date(now, engine.config.tz());
    let mut queue = engine.queue.lock();
    HttpResponse::Ok().json(StatusResponse {
        engine_state: engine.state(),
        capacity: engine.capacity_on(today),
        queue_length: queue.waiting_count(now),
        queue_by_urgency: queue.urgency_breakdown(now),
    })
}

// --- calendar & availability ---

async fn get_calendar(
    query: web::Query<CalendarQuery>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ScheduleError> {
    let engine = &state.engine;
    let slots = engine.slots_between(query.start, query.end)?;
    let tz = engine.config.tz();
    let from = local_to_utc(query.start, NaiveTime::MIN, tz);
    let to = local_to_utc(query.end.succ_opt().unwrap_or(query.end), NaiveTime::MIN, tz);
    Ok(HttpResponse::Ok().json(CalendarResponse {
        start: query.start,
        end: query.end,
        slots,
        interviews: engine.ledger.interviews_between(from, to),
    }))
}

async fn put_availability(
    body: web::Json<AvailabilityUpdate>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ScheduleError> {
    let update = body.into_inner();
    // validate everything before touching the store: all or nothing
    if let Some(template) = &update.template {
        template.validate()?;
    }
    if let Some(date_override) = &update.date_override {
        date_override.validate()?;
    }
    let mut availability = state.engine.availability.write();
    if let Some(template) = update.template {
        availability.set_template(template)?;
    }
    if let Some(date_override) = update.date_override {
        availability.upsert_override(date_override)?;
    }
    Ok(HttpResponse::Ok().json(serde_json::json!({ "success": true })))
}

async fn delete_override(
    path: web::Path<NaiveDate>,
    state: web::Data<AppState>,
) -> HttpResponse {
    let removed = state.engine.availability.write().remove_override(*path);
    HttpResponse::Ok().json(serde_json::json!({ "success": true, "removed": removed }))
}

// --- manual booking path ---

async fn schedule_interview(
    body: web::Json<ScheduleRequestBody>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ScheduleError> {
    let engine = &state.engine;
    let request = body.into_inner();
    let booking = BookingRequest {
        candidate_id: request.candidate_id.unwrap_or_else(Uuid::new_v4),
        candidate_name: request.candidate_name,
        start: request.start,
        duration_minutes: request
            .duration_minutes
            .unwrap_or(engine.config.slot_duration_minutes),
        interview_type: request.interview_type.unwrap_or(InterviewType::Video),
        notes: request.notes,
        meeting_link: request.meeting_link,
    };
    match engine
        .ledger
        .create_interview(booking, engine.buffer_minutes(), Utc::now())
    {
        Ok(interview) => {
            if let Some(id) = request.candidate_id {
                // best effort: the id may not correspond to a queue entry
                let _ = engine.queue.lock().mark_scheduled(id);
            }
            Ok(HttpResponse::Created().json(interview))
        }
        Err(ScheduleError::Conflict) => conflict_with_repick(engine, request.start),
        Err(e) => Err(e),
    }
}

async fn move_interview(
    path: web::Path<Uuid>,
    body: web::Json<MoveRequestBody>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ScheduleError> {
    let engine = &state.engine;
    match engine
        .ledger
        .move_interview(*path, body.start, engine.buffer_minutes(), Utc::now())
    {
        Ok(interview) => Ok(HttpResponse::Ok().json(interview)),
        Err(ScheduleError::Conflict) => conflict_with_repick(engine, body.start),
        Err(e) => Err(e),
    }
}

async fn cancel_interview(
    path: web::Path<Uuid>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ScheduleError> {
    let interview = state.engine.ledger.cancel_interview(*path)?;
    Ok(HttpResponse::Ok().json(interview))
}

async fn set_interview_status(
    path: web::Path<Uuid>,
    body: web::Json<StatusUpdateBody>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ScheduleError> {
    let interview = state.engine.ledger.set_status(*path, body.status)?;
    Ok(HttpResponse::Ok().json(interview))
}

/// Losing a booking race is expected; hand back fresh slots for the
/// requested day so the caller can re-pick instead of seeing a raw error.
fn conflict_with_repick(
    engine: &SchedulerEngine,
    requested: DateTime<Utc>,
) -> Result<HttpResponse, ScheduleError> {
    let date = utc_to_local_date(requested, engine.config.tz());
    let available: Vec<Slot> = engine
        .slots_between(date, date)?
        .into_iter()
        .filter(|s| s.available)
        .collect();
    Ok(HttpResponse::Conflict().json(serde_json::json!({
        "error": "slot taken, re-pick",
        "available_slots": available,
    })))
}

// --- candidate queue ---

async fn enqueue_candidate(
    body: web::Json<EnqueueRequest>,
    state: web::Data<AppState>,
) -> HttpResponse {
    let now = Utc::now();
    let request = body.into_inner();
    let entry = state.engine.queue.lock().enqueue(
        request.candidate_name,
        request.priority_score,
        request.deadline,
        now,
    );
    HttpResponse::Created().json(QueueEntryView::new(entry, now))
}

async fn list_queue(state: web::Data<AppState>) -> HttpResponse {
    let now = Utc::now();
    let entries: Vec<QueueEntryView> = state
        .engine
        .queue
        .lock()
        .entries(now)
        .into_iter()
        .map(|e| QueueEntryView::new(e, now))
        .collect();
    HttpResponse::Ok().json(entries)
}

async fn record_contact_attempt(
    path: web::Path<Uuid>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ScheduleError> {
    let now = Utc::now();
    let entry = state.engine.queue.lock().record_contact_attempt(*path)?;
    Ok(HttpResponse::Ok().json(QueueEntryView::new(entry, now)))
}

async fn withdraw_candidate(
    path: web::Path<Uuid>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ScheduleError> {
    state.engine.queue.lock().withdraw(*path)?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "success": true })))
}

/// Route table, shared between the server and the handler tests.
pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/api/engine/run", web::post().to(run_engine))
        .route("/api/engine/stop", web::post().to(emergency_stop))
        .route("/api/engine/resume", web::post().to(resume_engine))
        .route("/api/status", web::get().to(get_status))
        .route("/api/calendar", web::get().to(get_calendar))
        .route("/api/availability", web::put().to(put_availability))
        .service(
            web::resource("/api/availability/override/{date}")
                .route(web::delete().to(delete_override)),
        )
        .route("/api/schedule", web::post().to(schedule_interview))
        .service(web::resource("/api/move/{id}").route(web::put().to(move_interview)))
        .service(web::resource("/api/cancel/{id}").route(web::post().to(cancel_interview)))
        .service(
            web::resource("/api/interviews/{id}/status")
                .route(web::post().to(set_interview_status)),
        )
        .service(
            web::resource("/api/queue")
                .route(web::post().to(enqueue_candidate))
                .route(web::get().to(list_queue)),
        )
        .service(
            web::resource("/api/queue/{id}/contact-attempt")
                .route(web::post().to(record_contact_attempt)),
        )
        .service(web::resource("/api/queue/{id}").route(web::delete().to(withdraw_candidate)));
}

pub async fn start_server(port: u16, config: SchedulerConfig) -> std::io::Result<()> {
    let state = web::Data::new(AppState {
        engine: SchedulerEngine::new(config),
    });

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(middleware::Logger::default())
            .configure(routes)
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await
}
