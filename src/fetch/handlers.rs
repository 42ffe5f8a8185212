use crate::fetch::result::RetryScope;

/// Points in a navigation where caller-supplied handlers run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    WillNavigate,
    DocumentReady,
    FeatureComputed,
}

/// Handler verdict for the current navigation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerFlow {
    Continue,
    /// Stop early but treat the fetch as successful
    Break,
    /// Abort the fetch with the given retry scope
    Fail(RetryScope),
}

/// What a handler gets to look at
#[derive(Debug, Clone)]
pub struct PhaseContext<'a> {
    pub phase: Phase,
    pub url: &'a str,
    pub ready_state: Option<&'a str>,
}

type Handler = Box<dyn Fn(&PhaseContext<'_>) -> HandlerFlow + Send + Sync>;

/// Ordered set of navigation phase handlers. Handlers for a phase run in
/// registration order; the first non-Continue verdict wins.
#[derive(Default)]
pub struct HandlerChain {
    will_navigate: Vec<Handler>,
    document_ready: Vec<Handler>,
    feature_computed: Vec<Handler>,
}

impl HandlerChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_will_navigate<F>(mut self, handler: F) -> Self
    where
        F: Fn(&PhaseContext<'_>) -> HandlerFlow + Send + Sync + 'static,
    {
        self.will_navigate.push(Box::new(handler));
        self
    }

    pub fn on_document_ready<F>(mut self, handler: F) -> Self
    where
        F: Fn(&PhaseContext<'_>) -> HandlerFlow + Send + Sync + 'static,
    {
        self.document_ready.push(Box::new(handler));
        self
    }

    pub fn on_feature_computed<F>(mut self, handler: F) -> Self
    where
        F: Fn(&PhaseContext<'_>) -> HandlerFlow + Send + Sync + 'static,
    {
        self.feature_computed.push(Box::new(handler));
        self
    }

    pub fn run(&self, ctx: &PhaseContext<'_>) -> HandlerFlow {
        let handlers = match ctx.phase {
            Phase::WillNavigate => &self.will_navigate,
            Phase::DocumentReady => &self.document_ready,
            Phase::FeatureComputed => &self.feature_computed,
        };
        for handler in handlers {
            match handler(ctx) {
                HandlerFlow::Continue => {}
                verdict => return verdict,
            }
        }
        HandlerFlow::Continue
    }
}
