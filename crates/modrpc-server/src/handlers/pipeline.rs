//! Pipeline builder: folds an ordered list of handler factories into one
//! immutable chain ending in the [`DefaultHandler`].

use modrpc_transport::HttpExchange;
use tokio_util::sync::CancellationToken;

use super::{DefaultHandler, HandlerResult, Next, RequestHandler};
use crate::scope::Scope;

type Layer = Box<dyn FnOnce(Next) -> Next + Send>;

/// Ordered handler factories. The first one added runs first; the last one
/// runs right before the default handler.
#[derive(Default)]
pub struct PipelineBuilder {
    layers: Vec<Layer>,
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a handler built around the rest of the chain.
    pub fn with<H, F>(mut self, factory: F) -> Self
    where
        H: RequestHandler,
        F: FnOnce(Next) -> H + Send + 'static,
    {
        self.layers.push(Box::new(move |next| Next::new(factory(next))));
        self
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn build(self) -> Pipeline {
        let mut head = Next::new(DefaultHandler);
        let mut names = vec![head.name().to_string()];
        for layer in self.layers.into_iter().rev() {
            head = layer(head);
            names.push(head.name().to_string());
        }
        names.reverse();
        Pipeline { head, names }
    }
}

/// The built chain, shared read-only by every worker.
#[derive(Clone)]
pub struct Pipeline {
    head: Next,
    names: Vec<String>,
}

impl Pipeline {
    /// A pipeline holding only the default handler.
    pub fn empty() -> Self {
        PipelineBuilder::new().build()
    }

    pub async fn handle(&self, scope: &Scope, exchange: &HttpExchange, cancel: CancellationToken) -> HandlerResult {
        self.head.run(scope, exchange, cancel).await
    }

    /// Handler names from outermost to the default handler.
    pub fn names(&self) -> &[String] {
        &self.names
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline").field("handlers", &self.names).finish()
    }
}
