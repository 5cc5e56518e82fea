// ============================
// crates/backend-lib/src/handler.rs
// ============================
//! Per-connection message handler.
//!
//! Instantiated once per WebSocket connection; dispatches every inbound
//! event. Pairing failures answer with explicit events, mutation-path
//! failures drop silently, infra errors bubble up to the router where
//! they abort only the in-flight command.
//!
//! Role policy: `update_*` and `reset_room_code` are management-only.
//! Messages, doodles, reads, and intercom events are open to any paired
//! role; they represent shared collaborative state.

use metrics::counter;
use smartdoor_common::{ClientMessage, Note, ServerMessage};
use std::sync::Arc;
use tracing::debug;

use crate::auth::LoginOutcome;
use crate::error::AppError;
use crate::registry::{ConnectionId, Member, Outbound, OutboundSender, Role};
use crate::store::Mutator;
use crate::sync::Projection;
use crate::validation::{sanitize_calendars, sanitize_notes, sanitize_widgets};
use crate::AppState;
use uuid::Uuid;

pub struct ConnectionHandler {
    state: Arc<AppState>,
    connection_id: ConnectionId,
    tx: OutboundSender,
}

impl ConnectionHandler {
    pub fn new(state: Arc<AppState>, tx: OutboundSender) -> Self {
        Self {
            state,
            connection_id: Uuid::new_v4(),
            tx,
        }
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    /// Remove this connection from the registry (called on disconnect).
    pub fn unregister(&self) {
        self.state.registry.remove(&self.connection_id);
    }

    async fn send(&self, msg: ServerMessage) {
        let _ = self.tx.send(Outbound::Message(msg)).await;
    }

    /// The registry entry for this connection, or `None` while unpaired.
    fn member(&self) -> Option<Member> {
        self.state.registry.get(&self.connection_id)
    }

    #[allow(clippy::too_many_lines)]
    pub async fn handle_message(&self, msg: ClientMessage) -> Result<(), AppError> {
        match msg {
            // -------- pairing --------
            ClientMessage::JoinRoom {
                room_code,
                is_new_pairing,
            } => self.join_room(room_code, is_new_pairing).await,
            ClientMessage::Register { username, password } => {
                let result = self.state.accounts.register(&username, password).await;
                self.finish_login(result).await
            },
            ClientMessage::Login { username, password } => {
                let result = self.state.accounts.login(&username, password).await;
                self.finish_login(result).await
            },
            ClientMessage::LoginFromSession(code) => {
                let result = self.state.accounts.login_from_session(&code).await;
                self.finish_login(result).await
            },
            ClientMessage::Logout(code) => {
                self.state.accounts.logout(&code).await?;
                // Unpair immediately; a client ignoring the close frame
                // must not keep its management authority.
                self.unregister();
                let _ = self.tx.send(Outbound::Shutdown).await;
                Ok(())
            },

            // -------- read queries: unicast to the requester --------
            ClientMessage::GetUser => {
                self.answer(|doc| ServerMessage::UserUpdate(doc.user.clone()))
                    .await
            },
            ClientMessage::GetBackground => {
                self.answer(|doc| ServerMessage::BackgroundUpdate(doc.background_url.clone()))
                    .await
            },
            ClientMessage::GetWidgets => {
                self.answer(|doc| ServerMessage::WidgetsUpdate(doc.widgets.clone()))
                    .await
            },
            ClientMessage::GetNotes => {
                self.answer(|doc| ServerMessage::NotesUpdate(doc.notes.clone()))
                    .await
            },
            ClientMessage::GetDoodles => {
                self.answer(|doc| ServerMessage::DoodlesUpdate(doc.doodles.clone()))
                    .await
            },
            ClientMessage::GetRoomCode => {
                self.answer(|doc| ServerMessage::RoomId(doc.room_code.clone()))
                    .await
            },
            ClientMessage::GetCalendar => self.broadcast_calendar().await,

            // -------- management-only mutations --------
            ClientMessage::UpdateStatus(status) => {
                self.mutate(
                    true,
                    Box::new(move |doc| doc.user.status = status),
                    |doc| ServerMessage::UserUpdate(doc.user.clone()),
                )
                .await
            },
            ClientMessage::UpdateName(name) => {
                self.mutate(
                    true,
                    Box::new(move |doc| doc.user.name = name),
                    |doc| ServerMessage::UserUpdate(doc.user.clone()),
                )
                .await
            },
            ClientMessage::UpdateBackground(url) => {
                self.mutate(
                    true,
                    Box::new(move |doc| doc.background_url = url),
                    |doc| ServerMessage::BackgroundUpdate(doc.background_url.clone()),
                )
                .await
            },
            ClientMessage::UpdateWidgets(widgets) => {
                let slots = sanitize_widgets(widgets);
                self.mutate(
                    true,
                    Box::new(move |doc| doc.widgets = slots),
                    |doc| ServerMessage::WidgetsUpdate(doc.widgets.clone()),
                )
                .await
            },
            ClientMessage::UpdateNotes(notes) => {
                let notes: Vec<Note> = sanitize_notes(notes);
                self.mutate(
                    true,
                    Box::new(move |doc| doc.notes = notes),
                    |doc| ServerMessage::NotesUpdate(doc.notes.clone()),
                )
                .await
            },
            ClientMessage::UpdateCalendar(entries) => self.update_calendar(entries).await,
            ClientMessage::ResetRoomCode => self.reset_room_code().await,

            // -------- shared collaborative state: any paired role --------
            ClientMessage::AddDoodle(url) => {
                self.mutate(
                    false,
                    Box::new(move |doc| doc.doodles.push(url)),
                    |doc| ServerMessage::DoodlesUpdate(doc.doodles.clone()),
                )
                .await
            },
            ClientMessage::RemoveDoodle(url) => {
                self.mutate(
                    false,
                    Box::new(move |doc| doc.doodles.retain(|d| d != &url)),
                    |doc| ServerMessage::DoodlesUpdate(doc.doodles.clone()),
                )
                .await
            },
            ClientMessage::DeleteDoodles => {
                self.mutate(
                    false,
                    Box::new(|doc| doc.doodles.clear()),
                    |doc| ServerMessage::DoodlesUpdate(doc.doodles.clone()),
                )
                .await
            },
            ClientMessage::SendMessage(payload) => {
                if let Some(member) = self.member() {
                    self.state
                        .registry
                        .broadcast(&member.room_code, ServerMessage::NewMessage(payload))
                        .await;
                }
                Ok(())
            },
            ClientMessage::ClearMessages => {
                if let Some(member) = self.member() {
                    self.state
                        .registry
                        .broadcast(&member.room_code, ServerMessage::ClearMessages)
                        .await;
                }
                Ok(())
            },

            // -------- intercom --------
            ClientMessage::StartIntercomCall(request_id) => {
                if let Some(member) = self.member() {
                    self.state
                        .intercom
                        .start_call(&member.room_code, request_id)
                        .await?;
                }
                Ok(())
            },
            ClientMessage::DeclineCallRequest(request_id) => {
                self.relay_call_event(ServerMessage::DeclineCallRequest(request_id))
                    .await
            },
            ClientMessage::CancelCallRequest(request_id) => {
                self.relay_call_event(ServerMessage::CancelCallRequest(request_id))
                    .await
            },
            ClientMessage::EndIntercomCall(request_id) => {
                self.relay_call_event(ServerMessage::EndIntercomCall(request_id))
                    .await
            },
            ClientMessage::IntercomCallSignalling(payload) => {
                if let Some(member) = self.member() {
                    self.state
                        .intercom
                        .relay_signalling(&member.room_code, &self.connection_id, payload)
                        .await;
                }
                Ok(())
            },
        }
    }

    /// Pair as Display via room-code capability.
    async fn join_room(&self, room_code: String, is_new_pairing: bool) -> Result<(), AppError> {
        if self.state.store.find_by_room_code(&room_code).await?.is_none() {
            self.send(ServerMessage::InvalidRoomCode).await;
            return Ok(());
        }

        self.state.registry.register(
            self.connection_id,
            room_code.clone(),
            Role::Display,
            self.tx.clone(),
        );
        self.send(ServerMessage::RoomJoined {
            room_code: room_code.clone(),
        })
        .await;

        // Fresh pairings announce themselves so management clients can
        // acknowledge the new device.
        if is_new_pairing {
            self.state
                .registry
                .broadcast(&room_code, ServerMessage::NewDeviceJoined)
                .await;
        }
        Ok(())
    }

    /// Complete a credentials/session pairing: register as Management and
    /// answer with an explicit success or failure event.
    async fn finish_login(&self, result: Result<LoginOutcome, AppError>) -> Result<(), AppError> {
        match result {
            Ok(outcome) => {
                self.state.registry.register(
                    self.connection_id,
                    outcome.room_code.clone(),
                    Role::Management,
                    self.tx.clone(),
                );
                self.send(ServerMessage::LoginSuccess {
                    room_code: outcome.room_code,
                    session_code: outcome.session_code,
                    username: outcome.username,
                })
                .await;
                Ok(())
            },
            Err(
                e @ (AppError::Validation(_)
                | AppError::Auth(_)
                | AppError::Conflict(_)
                | AppError::NotFound(_)),
            ) => {
                self.send(ServerMessage::LoginFailure { reason: e.reason() })
                    .await;
                Ok(())
            },
            Err(e) => Err(e),
        }
    }

    /// Read query: answer only the requesting connection.
    async fn answer(&self, project: Projection) -> Result<(), AppError> {
        let Some(member) = self.member() else {
            return Ok(());
        };
        match self.state.sync.fetch(&member.room_code).await {
            Ok(doc) => {
                self.send(project(&doc)).await;
                Ok(())
            },
            // Room rotated away mid-flight; nothing to answer with.
            Err(AppError::NotFound(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// The generic pipeline entry: pairing check, role check, then
    /// sanitize/update/broadcast via the sync coordinator.
    async fn mutate(
        &self,
        management_only: bool,
        mutate: Mutator,
        project: Projection,
    ) -> Result<(), AppError> {
        let Some(member) = self.member() else {
            debug!(connection = %self.connection_id, "mutation from unpaired connection dropped");
            counter!(crate::metrics::SYNC_DROPPED).increment(1);
            return Ok(());
        };
        if management_only && member.role == Role::Display {
            debug!(connection = %self.connection_id, "management-only command from display dropped");
            counter!(crate::metrics::SYNC_DROPPED).increment(1);
            return Ok(());
        }
        self.state.sync.apply(&member.room_code, mutate, project).await
    }

    /// Persist the sanitized subscription list, then aggregate and
    /// broadcast the resulting feed set as one `calendar_update`.
    async fn update_calendar(
        &self,
        entries: Vec<smartdoor_common::CalendarSourcePatch>,
    ) -> Result<(), AppError> {
        let Some(member) = self.member() else {
            return Ok(());
        };
        if member.role == Role::Display {
            counter!(crate::metrics::SYNC_DROPPED).increment(1);
            return Ok(());
        }

        let sources = sanitize_calendars(entries);
        let Some(updated) = self
            .state
            .sync
            .stage(&member.room_code, Box::new(move |doc| doc.calendars = sources))
            .await?
        else {
            return Ok(());
        };

        let feeds = self.state.calendars.aggregate(&updated.calendars).await;
        self.state
            .registry
            .broadcast(&member.room_code, ServerMessage::CalendarUpdate(feeds))
            .await;
        Ok(())
    }

    /// Aggregate the room's current subscriptions and broadcast them.
    /// Calendar state is room-wide, so even the read path answers the
    /// whole room.
    async fn broadcast_calendar(&self) -> Result<(), AppError> {
        let Some(member) = self.member() else {
            return Ok(());
        };
        let doc = match self.state.sync.fetch(&member.room_code).await {
            Ok(doc) => doc,
            Err(AppError::NotFound(_)) => return Ok(()),
            Err(e) => return Err(e),
        };

        let feeds = self.state.calendars.aggregate(&doc.calendars).await;
        self.state
            .registry
            .broadcast(&member.room_code, ServerMessage::CalendarUpdate(feeds))
            .await;
        Ok(())
    }

    /// Rotate the room code and migrate/evict the room's members.
    async fn reset_room_code(&self) -> Result<(), AppError> {
        let Some(member) = self.member() else {
            return Ok(());
        };
        if member.role != Role::Management {
            counter!(crate::metrics::SYNC_DROPPED).increment(1);
            return Ok(());
        }

        let new_code = match self.state.accounts.reset_room_code(&member.room_code).await {
            Ok(code) => code,
            // Already rotated by a concurrent management client.
            Err(AppError::NotFound(_)) => return Ok(()),
            Err(e) => return Err(e),
        };

        self.state.registry.rotate(&member.room_code, &new_code).await;
        Ok(())
    }

    async fn relay_call_event(&self, event: ServerMessage) -> Result<(), AppError> {
        if let Some(member) = self.member() {
            self.state
                .intercom
                .relay_lifecycle(&member.room_code, event)
                .await;
        }
        Ok(())
    }
}
