use gloo_timers::future::TimeoutFuture;
use serde_json::{json, Value};
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::{Rc, Weak};
use wasm_bindgen::closure::Closure;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::spawn_local;
use web_sys::{console, CloseEvent, Event, MessageEvent, WebSocket};

use crate::config::AgentConfig;
use crate::error::EngineError;
use crate::executor::{PlanExecutor, PlanStatus};

const NORMAL_CLOSURE: u16 = 1000;

/// Plan half of an inbound AI response.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecuteRequest {
    pub plan: Value,
    pub parameters: Value,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AiResponse {
    pub speak: Option<String>,
    pub execute: Option<ExecuteRequest>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Ai(AiResponse),
    /// `{type: "error", message}` from the backend.
    Error(String),
    Unexpected(Value),
}

fn ai_response_from(value: &Value) -> AiResponse {
    let speak = value
        .get("speak")
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string);
    let execute = value.get("execute").filter(|e| !e.is_null()).map(|e| ExecuteRequest {
        plan: e.get("plan").cloned().unwrap_or(Value::Null),
        parameters: e
            .get("parameters")
            .filter(|p| p.is_object())
            .cloned()
            .unwrap_or_else(|| json!({})),
    });
    AiResponse { speak, execute }
}

/// Decodes one WebSocket text frame.
pub fn parse_inbound(text: &str) -> Result<Inbound, EngineError> {
    let value: Value = serde_json::from_str(text).map_err(|e| EngineError::InvalidData {
        action: "inbound message".to_string(),
        details: e.to_string(),
    })?;

    if value.get("speak").is_some() || value.get("execute").is_some() {
        return Ok(Inbound::Ai(ai_response_from(&value)));
    }
    match value.get("type").and_then(Value::as_str) {
        Some("ai_response") => match value.get("ai_response").filter(|r| r.is_object()) {
            Some(response) => Ok(Inbound::Ai(ai_response_from(response))),
            None => Ok(Inbound::Unexpected(value)),
        },
        Some("error") => match value.get("message").and_then(Value::as_str) {
            Some(message) => Ok(Inbound::Error(message.to_string())),
            None => Ok(Inbound::Unexpected(value)),
        },
        _ => Ok(Inbound::Unexpected(value)),
    }
}

struct SocketHandlers {
    _on_open: Closure<dyn FnMut(Event)>,
    _on_message: Closure<dyn FnMut(MessageEvent)>,
    _on_close: Closure<dyn FnMut(CloseEvent)>,
    _on_error: Closure<dyn FnMut(Event)>,
}

struct ChannelInner {
    config: AgentConfig,
    executor: Rc<PlanExecutor>,
    socket: RefCell<Option<WebSocket>>,
    handlers: RefCell<Option<SocketHandlers>>,
    queue: RefCell<VecDeque<ExecuteRequest>>,
    busy: Cell<bool>,
    closing: Cell<bool>,
    reconnect_attempts: Cell<u32>,
    last_status: RefCell<Option<PlanStatus>>,
}

/// Receives speak/execute instructions over a WebSocket and feeds plans to
/// the executor one at a time.
#[derive(Clone)]
pub struct CommandChannel {
    inner: Rc<ChannelInner>,
}

impl CommandChannel {
    pub fn new(config: &AgentConfig, executor: Rc<PlanExecutor>) -> Self {
        CommandChannel {
            inner: Rc::new(ChannelInner {
                config: config.clone(),
                executor,
                socket: RefCell::new(None),
                handlers: RefCell::new(None),
                queue: RefCell::new(VecDeque::new()),
                busy: Cell::new(false),
                closing: Cell::new(false),
                reconnect_attempts: Cell::new(0),
                last_status: RefCell::new(None),
            }),
        }
    }

    pub fn start(&self) -> Result<(), EngineError> {
        self.inner.closing.set(false);
        self.inner.reconnect_attempts.set(0);
        connect(&self.inner)
    }

    /// Closes the socket and drops queued plans. A running plan finishes.
    pub fn stop(&self) {
        self.inner.closing.set(true);
        self.inner.queue.borrow_mut().clear();
        if let Some(socket) = self.inner.socket.borrow_mut().take() {
            socket.set_onopen(None);
            socket.set_onmessage(None);
            socket.set_onclose(None);
            socket.set_onerror(None);
            if socket.ready_state() != WebSocket::CLOSED {
                console::log_1(&"channel: closing connection".into());
                if let Err(e) = socket.close_with_code_and_reason(NORMAL_CLOSURE, "Client closing connection") {
                    console::warn_1(&format!("channel: close failed: {}", EngineError::from(e)).into());
                }
            }
        }
        self.inner.handlers.borrow_mut().take();
    }

    pub fn is_connected(&self) -> bool {
        self.inner
            .socket
            .borrow()
            .as_ref()
            .map_or(false, |s| s.ready_state() == WebSocket::OPEN)
    }

    pub fn pending_plans(&self) -> usize {
        self.inner.queue.borrow().len()
    }

    pub fn last_status(&self) -> Option<PlanStatus> {
        self.inner.last_status.borrow().clone()
    }

    /// Handles one inbound frame as if it came over the socket.
    pub fn handle_text(&self, text: &str) {
        handle_text(&self.inner, text);
    }
}

fn handle_text(inner: &Rc<ChannelInner>, text: &str) {
    if inner.config.debug {
        console::log_1(&format!("channel: received {}", text).into());
    }
    match parse_inbound(text) {
        Ok(Inbound::Ai(response)) => {
            if let Some(speak) = response.speak.as_deref() {
                let interaction = inner.executor.interaction();
                interaction.speak(speak);
                interaction.notify(&inner.config.sender_name, speak);
            }
            if let Some(request) = response.execute {
                inner.queue.borrow_mut().push_back(request);
                drain(inner);
            }
        }
        Ok(Inbound::Error(message)) => console::error_1(&format!("channel: backend error: {}", message).into()),
        Ok(Inbound::Unexpected(value)) => {
            console::warn_1(&format!("channel: unexpected message: {}", value).into())
        }
        Err(e) => console::error_1(&format!("channel: could not parse message: {}", e).into()),
    }
}

fn drain(inner: &Rc<ChannelInner>) {
    if inner.busy.replace(true) {
        return;
    }
    let inner = inner.clone();
    spawn_local(async move {
        loop {
            let next = inner.queue.borrow_mut().pop_front();
            let request = match next {
                Some(request) => request,
                None => break,
            };
            let status = inner
                .executor
                .execute_plan_json(&request.plan, &request.parameters)
                .await;
            console::log_1(&format!("channel: plan finished as {:?}", status.status).into());
            *inner.last_status.borrow_mut() = Some(status);
        }
        inner.busy.set(false);
    });
}

fn connect(inner: &Rc<ChannelInner>) -> Result<(), EngineError> {
    if let Some(socket) = inner.socket.borrow().as_ref() {
        let state = socket.ready_state();
        if state == WebSocket::OPEN || state == WebSocket::CONNECTING {
            console::log_1(&"channel: already connected or connecting".into());
            return Ok(());
        }
    }

    let url = inner.config.websocket_endpoint();
    console::log_1(&format!("channel: connecting to {}", url).into());
    let socket = WebSocket::new(&url)?;
    let weak = Rc::downgrade(inner);

    let on_open = {
        let weak = weak.clone();
        Closure::<dyn FnMut(Event)>::new(move |_: Event| {
            if let Some(inner) = weak.upgrade() {
                inner.reconnect_attempts.set(0);
                send_hello(&inner);
            }
        })
    };
    let on_message = {
        let weak = weak.clone();
        Closure::<dyn FnMut(MessageEvent)>::new(move |event: MessageEvent| {
            let inner = match weak.upgrade() {
                Some(inner) => inner,
                None => return,
            };
            match event.data().as_string() {
                Some(text) => handle_text(&inner, &text),
                None => console::warn_1(&"channel: ignoring non-text frame".into()),
            }
        })
    };
    let on_close = {
        let weak = weak.clone();
        Closure::<dyn FnMut(CloseEvent)>::new(move |event: CloseEvent| {
            if let Some(inner) = weak.upgrade() {
                on_closed(&inner, event.code(), &event.reason());
            }
        })
    };
    let on_error = Closure::<dyn FnMut(Event)>::new(move |_: Event| {
        console::error_1(&"channel: socket error".into());
    });

    socket.set_onopen(Some(on_open.as_ref().unchecked_ref()));
    socket.set_onmessage(Some(on_message.as_ref().unchecked_ref()));
    socket.set_onclose(Some(on_close.as_ref().unchecked_ref()));
    socket.set_onerror(Some(on_error.as_ref().unchecked_ref()));

    *inner.handlers.borrow_mut() = Some(SocketHandlers {
        _on_open: on_open,
        _on_message: on_message,
        _on_close: on_close,
        _on_error: on_error,
    });
    *inner.socket.borrow_mut() = Some(socket);
    Ok(())
}

fn send_hello(inner: &ChannelInner) {
    let hello = json!({"type": "client_hello", "message": "Hello from browser client!"}).to_string();
    if let Some(socket) = inner.socket.borrow().as_ref() {
        match socket.send_with_str(&hello) {
            Ok(()) => console::log_1(&"channel: sent client_hello".into()),
            Err(e) => console::error_1(&format!("channel: client_hello failed: {}", EngineError::from(e)).into()),
        }
    }
}

/// Whether an unexpected close should be retried.
pub fn should_reconnect(closing: bool, code: u16, attempts: u32, max_attempts: u32) -> bool {
    !closing && code != NORMAL_CLOSURE && attempts < max_attempts
}

fn on_closed(inner: &Rc<ChannelInner>, code: u16, reason: &str) {
    console::log_1(&format!("channel: connection closed ({}) {}", code, reason).into());
    let timings = &inner.config.timings;
    let attempts = inner.reconnect_attempts.get();
    if should_reconnect(inner.closing.get(), code, attempts, timings.reconnect_attempts) {
        console::log_1(
            &format!(
                "channel: reconnecting in {}ms (attempt {}/{})",
                timings.reconnect_delay_ms,
                attempts + 1,
                timings.reconnect_attempts
            )
            .into(),
        );
        let weak: Weak<ChannelInner> = Rc::downgrade(inner);
        let delay = timings.reconnect_delay_ms;
        spawn_local(async move {
            TimeoutFuture::new(delay).await;
            if let Some(inner) = weak.upgrade() {
                if inner.closing.get() {
                    return;
                }
                inner.reconnect_attempts.set(inner.reconnect_attempts.get() + 1);
                if let Err(e) = connect(&inner) {
                    console::error_1(&format!("channel: reconnect failed: {}", e).into());
                }
            }
        });
    } else if !inner.closing.get() && code != NORMAL_CLOSURE {
        console::error_1(
            &format!("channel: giving up after {} reconnection attempts", timings.reconnect_attempts).into(),
        );
    }
}
