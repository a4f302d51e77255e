use crate::types::{ModelUsage, StreamChunk, StreamEvent, ToolCallChunk};

/// Progress hooks invoked while a canonical stream is consumed
///
/// Every method has a no-op default so implementors only override what they
/// care about.
pub trait StreamCallbacks: Send + Sync {
    fn on_start(&self) {}

    fn on_text(&self, _text: &str) {}

    fn on_tool_calls(&self, _calls: &[ToolCallChunk]) {}

    fn on_usage(&self, _usage: &ModelUsage) {}

    /// Called once when the stream completes, with the accumulated text
    fn on_completion(&self, _text: &str) {}
}

/// Tracks state needed to drive [`StreamCallbacks`] across chunks
#[derive(Debug, Default)]
pub(crate) struct CallbackState {
    started: bool,
    text: String,
}

impl CallbackState {
    pub(crate) fn observe(&mut self, callbacks: &dyn StreamCallbacks, chunk: &StreamChunk) {
        if !self.started {
            self.started = true;
            callbacks.on_start();
        }

        match &chunk.event {
            StreamEvent::Text(text) => {
                self.text.push_str(text);
                callbacks.on_text(text);
            }
            StreamEvent::ToolCalls(calls) => callbacks.on_tool_calls(calls),
            StreamEvent::Usage(usage) => callbacks.on_usage(usage),
            _ => {}
        }
    }

    pub(crate) fn finish(&mut self, callbacks: &dyn StreamCallbacks) {
        if !self.started {
            self.started = true;
            callbacks.on_start();
        }
        callbacks.on_completion(&self.text);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<String>>);

    impl StreamCallbacks for Recorder {
        fn on_start(&self) {
            self.0.lock().unwrap().push("start".to_owned());
        }

        fn on_text(&self, text: &str) {
            self.0.lock().unwrap().push(format!("text:{text}"));
        }

        fn on_usage(&self, usage: &ModelUsage) {
            self.0.lock().unwrap().push(format!("usage:{}", usage.total_tokens));
        }

        fn on_completion(&self, text: &str) {
            self.0.lock().unwrap().push(format!("done:{text}"));
        }
    }

    #[test]
    fn drives_hooks_in_order() {
        let recorder = Recorder::default();
        let mut state = CallbackState::default();

        state.observe(&recorder, &StreamChunk::new("a", StreamEvent::Text("he".to_owned())));
        state.observe(&recorder, &StreamChunk::new("a", StreamEvent::Text("llo".to_owned())));
        state.observe(
            &recorder,
            &StreamChunk::new(
                "a",
                StreamEvent::Usage(ModelUsage {
                    total_tokens: 3,
                    ..ModelUsage::default()
                }),
            ),
        );
        state.finish(&recorder);

        assert_eq!(
            *recorder.0.lock().unwrap(),
            ["start", "text:he", "text:llo", "usage:3", "done:hello"]
        );
    }
}
