use futures::future::{select, select_all, Either, FutureExt, LocalBoxFuture};
use gloo_timers::future::TimeoutFuture;
use js_sys::{Function, Promise, Reflect};
use wasm_bindgen::{JsCast, JsValue};
use wasm_bindgen_futures::{spawn_local, JsFuture};
use web_sys::console;

use crate::config::EngineTimings;
use crate::error::{js_error_message, EngineError};

const CHAT_MODULE: &str = "chatModule";
const SPEECH_MODULE: &str = "speechModule";
const NEGATIONS: &[&str] = &["no", "not", "don't", "dont", "never", "nope", "cancel", "stop"];
pub(crate) const REPROMPT: &str = "Sorry, I didn't understand. Please respond with 'yes' or 'no'.";

/// The user-facing side of plan execution: questions, confirmations and
/// transcript lines. Everything here runs on the page's event loop.
pub trait Interaction {
    /// Free-form input. `Ok(None)` means the user cancelled or never answered.
    fn ask_user<'a>(
        &'a self,
        prompt: &'a str,
        sensitive: bool,
    ) -> LocalBoxFuture<'a, Result<Option<String>, EngineError>>;

    /// `Some(true)` only for an explicit yes; `None` when no usable answer arrived.
    fn ask_confirmation<'a>(&'a self, prompt: &'a str) -> LocalBoxFuture<'a, Option<bool>>;

    fn notify(&self, sender: &str, text: &str);

    fn speak(&self, text: &str);
}

/// Classified answer to a yes/no question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    Yes,
    No,
    Unrecognized,
    NoAnswer,
}

pub fn classify_text(text: &str) -> Reply {
    let normalized = text
        .replace('\u{2019}', "'")
        .trim()
        .trim_end_matches(|c: char| c == '.' || c == '!' || c == ',')
        .to_lowercase();
    if normalized.is_empty() {
        return Reply::NoAnswer;
    }
    match normalized.as_str() {
        "yes" | "yep" | "yeah" | "y" | "affirmative" | "ok" | "okay" | "sure" => Reply::Yes,
        "no" | "nope" | "n" | "negative" | "cancel" | "stop" => Reply::No,
        other => {
            let words: Vec<&str> = other
                .split(|c: char| !(c.is_alphanumeric() || c == '\''))
                .filter(|w| !w.is_empty())
                .collect();
            if words.iter().any(|w| NEGATIONS.contains(w)) {
                Reply::No
            } else if words.contains(&"proceed") {
                Reply::Yes
            } else {
                Reply::Unrecognized
            }
        }
    }
}

/// Chat widgets resolve with booleans, speech with transcripts, both with
/// `null` when they give up.
fn classify_answer(value: &JsValue) -> Reply {
    if let Some(flag) = value.as_bool() {
        return if flag { Reply::Yes } else { Reply::No };
    }
    match value.as_string() {
        Some(text) => classify_text(&text),
        None => Reply::NoAnswer,
    }
}

fn window_module(name: &str) -> Result<JsValue, EngineError> {
    let unavailable = || EngineError::TransportUnavailable {
        module: format!("window.{}", name),
    };
    let window = web_sys::window().ok_or_else(unavailable)?;
    let module = Reflect::get(&window, &JsValue::from_str(name)).map_err(|_| unavailable())?;
    if module.is_undefined() || module.is_null() {
        return Err(unavailable());
    }
    Ok(module)
}

fn module_method(module: &JsValue, module_name: &str, method: &str) -> Result<Function, EngineError> {
    Reflect::get(module, &JsValue::from_str(method))
        .ok()
        .and_then(|f| f.dyn_into::<Function>().ok())
        .ok_or_else(|| EngineError::TransportUnavailable {
            module: format!("window.{}.{}", module_name, method),
        })
}

fn call_module(module_name: &str, method: &str, args: &[JsValue]) -> Result<JsValue, EngineError> {
    let module = window_module(module_name)?;
    let function = module_method(&module, module_name, method)?;
    let result = match args {
        [] => function.call0(&module),
        [a] => function.call1(&module, a),
        [a, b] => function.call2(&module, a, b),
        _ => function.apply(&module, &args.iter().collect::<js_sys::Array>()),
    };
    result.map_err(EngineError::from)
}

/// Resolves a possibly-promise return value. `Ok(None)` on timeout.
async fn settle(value: JsValue, timeout_ms: u32) -> Result<Option<JsValue>, EngineError> {
    let promise = match value.dyn_into::<Promise>() {
        Ok(promise) => promise,
        Err(plain) => return Ok(Some(plain)),
    };
    match select(JsFuture::from(promise), TimeoutFuture::new(timeout_ms)).await {
        Either::Left((Ok(answer), _)) => Ok(Some(answer)),
        Either::Left((Err(e), _)) => Err(EngineError::from(e)),
        Either::Right(_) => Ok(None),
    }
}

enum Outcome {
    Answer(Reply),
    TimedOut,
}

/// Bridges to the extension's `window.chatModule` and `window.speechModule`.
pub struct WindowInteraction {
    sender: String,
    confirmation_timeout_ms: u32,
    input_timeout_ms: u32,
    max_reprompts: u32,
}

impl WindowInteraction {
    pub fn new(timings: &EngineTimings, sender: &str) -> Self {
        WindowInteraction {
            sender: sender.to_string(),
            confirmation_timeout_ms: timings.confirmation_timeout_ms,
            input_timeout_ms: timings.input_timeout_ms,
            max_reprompts: timings.max_reprompts,
        }
    }

    async fn ask_user_inner(&self, prompt: &str, sensitive: bool) -> Result<Option<String>, EngineError> {
        let pending = match call_module(
            SPEECH_MODULE,
            "askUserInput",
            &[JsValue::from_str(prompt), JsValue::from_bool(sensitive)],
        ) {
            Ok(pending) => pending,
            Err(EngineError::TransportUnavailable { .. }) => {
                // No speech wrapper: the chat widget's question box still returns typed text.
                console::warn_1(&"interaction: speechModule unavailable, asking through chat".into());
                call_module(CHAT_MODULE, "askConfirmation", &[JsValue::from_str(prompt)])?
            }
            Err(e) => return Err(e),
        };
        let answer = settle(pending, self.input_timeout_ms).await?;
        Ok(answer
            .and_then(|value| value.as_string())
            .filter(|text| !text.trim().is_empty()))
    }

    /// One round of asking every available channel; the first definite answer wins.
    async fn ask_round(&self, prompt: &str) -> Reply {
        let mut pending: Vec<LocalBoxFuture<'static, Outcome>> = Vec::new();
        for module in [CHAT_MODULE, SPEECH_MODULE] {
            match call_module(module, "askConfirmation", &[JsValue::from_str(prompt)]) {
                Ok(value) => {
                    let timeout = self.confirmation_timeout_ms;
                    pending.push(
                        async move {
                            match settle(value, timeout).await {
                                Ok(Some(answer)) => Outcome::Answer(classify_answer(&answer)),
                                Ok(None) => Outcome::Answer(Reply::NoAnswer),
                                Err(e) => {
                                    console::warn_1(&format!("interaction: confirmation failed: {}", e).into());
                                    Outcome::Answer(Reply::NoAnswer)
                                }
                            }
                        }
                        .boxed_local(),
                    );
                }
                Err(e) => console::warn_1(&format!("interaction: {}", e).into()),
            }
        }
        if pending.is_empty() {
            return Reply::NoAnswer;
        }

        let mut channels = pending.len();
        let timeout = self.confirmation_timeout_ms;
        pending.push(
            async move {
                TimeoutFuture::new(timeout).await;
                Outcome::TimedOut
            }
            .boxed_local(),
        );

        while channels > 0 {
            let (outcome, _, rest) = select_all(pending).await;
            match outcome {
                Outcome::TimedOut => return Reply::NoAnswer,
                Outcome::Answer(Reply::NoAnswer) => {
                    channels -= 1;
                    pending = rest;
                }
                Outcome::Answer(reply) => return reply,
            }
        }
        Reply::NoAnswer
    }

    async fn ask_confirmation_inner(&self, prompt: &str) -> Option<bool> {
        for attempt in 0..=self.max_reprompts {
            match self.ask_round(prompt).await {
                Reply::Yes => return Some(true),
                Reply::No => return Some(false),
                Reply::NoAnswer => return None,
                Reply::Unrecognized if attempt < self.max_reprompts => {
                    self.notify(&self.sender, REPROMPT);
                    self.speak(REPROMPT);
                }
                Reply::Unrecognized => {}
            }
        }
        None
    }
}

impl Interaction for WindowInteraction {
    fn ask_user<'a>(
        &'a self,
        prompt: &'a str,
        sensitive: bool,
    ) -> LocalBoxFuture<'a, Result<Option<String>, EngineError>> {
        self.ask_user_inner(prompt, sensitive).boxed_local()
    }

    fn ask_confirmation<'a>(&'a self, prompt: &'a str) -> LocalBoxFuture<'a, Option<bool>> {
        self.ask_confirmation_inner(prompt).boxed_local()
    }

    fn notify(&self, sender: &str, text: &str) {
        if let Err(e) = call_module(CHAT_MODULE, "addMessage", &[JsValue::from_str(sender), JsValue::from_str(text)]) {
            console::log_1(&format!("[{}] {} ({})", sender, text, e).into());
        }
    }

    fn speak(&self, text: &str) {
        match call_module(SPEECH_MODULE, "speak", &[JsValue::from_str(text)]) {
            Ok(value) => {
                if let Ok(promise) = value.dyn_into::<Promise>() {
                    spawn_local(async move {
                        if let Err(e) = JsFuture::from(promise).await {
                            console::warn_1(&format!("interaction: speak failed: {}", js_error_message(&e)).into());
                        }
                    });
                }
            }
            Err(e) => console::warn_1(&format!("interaction: {}", e).into()),
        }
    }
}

#[cfg(test)]
pub(crate) mod scripted {
    use super::*;
    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;

    /// Replays canned answers and records everything the engine says.
    #[derive(Default)]
    pub(crate) struct ScriptedInteraction {
        pub answers: RefCell<VecDeque<Option<String>>>,
        pub confirmations: RefCell<VecDeque<Option<bool>>>,
        pub prompts: RefCell<Vec<(String, bool)>>,
        pub confirmation_prompts: RefCell<Vec<String>>,
        pub notices: RefCell<Vec<String>>,
        pub spoken: RefCell<Vec<String>>,
        pub ask_calls: Cell<usize>,
        pub unavailable: Cell<bool>,
    }

    impl ScriptedInteraction {
        pub fn with_answers(answers: &[Option<&str>]) -> Self {
            let scripted = ScriptedInteraction::default();
            scripted
                .answers
                .borrow_mut()
                .extend(answers.iter().map(|a| a.map(str::to_string)));
            scripted
        }

        pub fn with_confirmations(confirmations: &[Option<bool>]) -> Self {
            let scripted = ScriptedInteraction::default();
            scripted.confirmations.borrow_mut().extend(confirmations.iter().copied());
            scripted
        }
    }

    impl Interaction for ScriptedInteraction {
        fn ask_user<'a>(
            &'a self,
            prompt: &'a str,
            sensitive: bool,
        ) -> LocalBoxFuture<'a, Result<Option<String>, EngineError>> {
            self.ask_calls.set(self.ask_calls.get() + 1);
            self.prompts.borrow_mut().push((prompt.to_string(), sensitive));
            let result = if self.unavailable.get() {
                Err(EngineError::TransportUnavailable { module: "window.speechModule".to_string() })
            } else {
                Ok(self.answers.borrow_mut().pop_front().flatten())
            };
            futures::future::ready(result).boxed_local()
        }

        fn ask_confirmation<'a>(&'a self, prompt: &'a str) -> LocalBoxFuture<'a, Option<bool>> {
            self.confirmation_prompts.borrow_mut().push(prompt.to_string());
            let answer = self.confirmations.borrow_mut().pop_front().flatten();
            futures::future::ready(answer).boxed_local()
        }

        fn notify(&self, _sender: &str, text: &str) {
            self.notices.borrow_mut().push(text.to_string());
        }

        fn speak(&self, text: &str) {
            self.spoken.borrow_mut().push(text.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wasm_bindgen_test::*;

    wasm_bindgen_test_configure!(run_in_browser);

    #[test]
    fn test_classify_text() {
        assert_eq!(classify_text("Yes"), Reply::Yes);
        assert_eq!(classify_text(" yep. "), Reply::Yes);
        assert_eq!(classify_text("okay!"), Reply::Yes);
        assert_eq!(classify_text("please proceed"), Reply::Yes);
        assert_eq!(classify_text("No"), Reply::No);
        assert_eq!(classify_text("cancel"), Reply::No);
        assert_eq!(classify_text("negative"), Reply::No);
        assert_eq!(classify_text("banana"), Reply::Unrecognized);
        assert_eq!(classify_text("   "), Reply::NoAnswer);
    }

    #[test]
    fn test_classify_text_negated_proceed_is_no() {
        assert_eq!(classify_text("don't proceed"), Reply::No);
        assert_eq!(classify_text("Don\u{2019}t proceed"), Reply::No);
        assert_eq!(classify_text("do not proceed"), Reply::No);
        assert_eq!(classify_text("no, do not proceed"), Reply::No);
        assert_eq!(classify_text("never proceed"), Reply::No);
        assert_eq!(classify_text("yes, proceed"), Reply::Yes);
    }

    #[wasm_bindgen_test]
    fn test_classify_answer_accepts_booleans_and_text() {
        assert_eq!(classify_answer(&JsValue::from_bool(true)), Reply::Yes);
        assert_eq!(classify_answer(&JsValue::from_bool(false)), Reply::No);
        assert_eq!(classify_answer(&JsValue::from_str("nope")), Reply::No);
        assert_eq!(classify_answer(&JsValue::NULL), Reply::NoAnswer);
    }

    #[wasm_bindgen_test]
    async fn test_missing_modules_are_unavailable() {
        let interaction = WindowInteraction::new(&EngineTimings::default(), "Saccessco");
        // The test page installs neither module.
        match interaction.ask_user("Name?", false).await {
            Err(EngineError::TransportUnavailable { module }) => assert_eq!(module, "window.chatModule"),
            other => panic!("Expected TransportUnavailable, got {:?}", other),
        }
        assert_eq!(interaction.ask_confirmation("Proceed automatically?").await, None);
        // Notices without a chat widget only reach the console.
        interaction.notify("Saccessco", "hello");
    }

    #[wasm_bindgen_test]
    async fn test_unrecognized_confirmation_is_reprompted_twice() {
        use js_sys::Object;
        use std::cell::{Cell, RefCell};
        use std::rc::Rc;
        use wasm_bindgen::closure::Closure;

        let asks = Rc::new(Cell::new(0usize));
        let notices = Rc::new(RefCell::new(Vec::<(String, String)>::new()));

        let counter = asks.clone();
        let ask = Closure::<dyn FnMut(JsValue) -> JsValue>::new(move |_prompt: JsValue| {
            counter.set(counter.get() + 1);
            JsValue::from_str("banana")
        });
        let transcript = notices.clone();
        let add_message = Closure::<dyn FnMut(JsValue, JsValue)>::new(move |sender: JsValue, text: JsValue| {
            transcript
                .borrow_mut()
                .push((sender.as_string().unwrap(), text.as_string().unwrap()));
        });

        let chat = Object::new();
        Reflect::set(&chat, &"askConfirmation".into(), ask.as_ref()).unwrap();
        Reflect::set(&chat, &"addMessage".into(), add_message.as_ref()).unwrap();
        let window = web_sys::window().unwrap();
        Reflect::set(&window, &CHAT_MODULE.into(), &chat).unwrap();

        let mut timings = EngineTimings::default();
        timings.confirmation_timeout_ms = 200;
        let interaction = WindowInteraction::new(&timings, "Helper");
        let answer = interaction.ask_confirmation("Proceed automatically?").await;

        Reflect::delete_property(&window, &CHAT_MODULE.into()).unwrap();

        assert_eq!(answer, None);
        assert_eq!(asks.get(), 3);
        let notices = notices.borrow();
        assert_eq!(notices.len(), 2);
        assert!(notices
            .iter()
            .all(|(sender, text)| sender == "Helper" && text == REPROMPT));
    }
}
