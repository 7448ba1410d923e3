//! Service/method dispatch table.

use std::{collections::BTreeMap, future::Future, marker::PhantomData, sync::Arc};

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use crate::{HandlerError, RegistrationError, RpcError};

#[async_trait]
/// Trait contract for one unary `(service, method)` handler.
pub trait UnaryHandler<C>: Send + Sync {
    async fn handle(&self, context: Arc<C>, message: Value) -> Result<Value, HandlerError>;
}

#[async_trait]
impl<C, F, Fut> UnaryHandler<C> for F
where
    C: Send + Sync + 'static,
    F: Fn(Arc<C>, Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, HandlerError>> + Send + 'static,
{
    async fn handle(&self, context: Arc<C>, message: Value) -> Result<Value, HandlerError> {
        (self)(context, message).await
    }
}

/// Adapts a typed handler to the opaque payload boundary.
struct TypedUnaryHandler<F, Req, Resp> {
    rpc_name: String,
    handler: F,
    _payload: PhantomData<fn(Req) -> Resp>,
}

#[async_trait]
impl<C, F, Fut, Req, Resp> UnaryHandler<C> for TypedUnaryHandler<F, Req, Resp>
where
    C: Send + Sync + 'static,
    F: Fn(Arc<C>, Req) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Resp, HandlerError>> + Send + 'static,
    Req: DeserializeOwned + Send + 'static,
    Resp: Serialize + Send + 'static,
{
    async fn handle(&self, context: Arc<C>, message: Value) -> Result<Value, HandlerError> {
        let request = serde_json::from_value::<Req>(message).map_err(|error| {
            HandlerError::new(format!(
                "invalid request payload for {}: {error}",
                self.rpc_name
            ))
        })?;
        let response = (self.handler)(context, request).await?;
        serde_json::to_value(response).map_err(|error| {
            HandlerError::new(format!(
                "failed to encode response payload for {}: {error}",
                self.rpc_name
            ))
        })
    }
}

type HandlerMap<C> = BTreeMap<String, BTreeMap<String, Arc<dyn UnaryHandler<C>>>>;

/// Immutable `service -> method -> handler` table.
pub struct ServiceHandlers<C> {
    services: HandlerMap<C>,
}

impl<C> std::fmt::Debug for ServiceHandlers<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut map = f.debug_map();
        for (service, methods) in &self.services {
            map.entry(service, &methods.keys().collect::<Vec<_>>());
        }
        map.finish()
    }
}

impl<C> ServiceHandlers<C>
where
    C: Send + Sync + 'static,
{
    pub fn builder() -> ServiceHandlersBuilder<C> {
        ServiceHandlersBuilder::default()
    }

    /// Resolves a handler by exact service and method name.
    pub fn resolve(
        &self,
        service: &str,
        method: &str,
    ) -> Result<Arc<dyn UnaryHandler<C>>, RpcError> {
        let methods = self
            .services
            .get(service)
            .ok_or_else(|| RpcError::ServiceNotFound {
                service: service.to_string(),
            })?;
        methods
            .get(method)
            .cloned()
            .ok_or_else(|| RpcError::MethodNotFound {
                service: service.to_string(),
                method: method.to_string(),
            })
    }

    pub fn contains(&self, service: &str, method: &str) -> bool {
        self.services
            .get(service)
            .is_some_and(|methods| methods.contains_key(method))
    }

    pub fn services(&self) -> impl Iterator<Item = &str> {
        self.services.keys().map(String::as_str)
    }

    pub fn methods(&self, service: &str) -> Vec<&str> {
        self.services
            .get(service)
            .map(|methods| methods.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Total number of registered `(service, method)` pairs.
    pub fn len(&self) -> usize {
        self.services.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct ServiceHandlersBuilder<C> {
    services: HandlerMap<C>,
    errors: Vec<RegistrationError>,
}

impl<C> Default for ServiceHandlersBuilder<C> {
    fn default() -> Self {
        Self {
            services: BTreeMap::new(),
            errors: Vec::new(),
        }
    }
}

impl<C> ServiceHandlersBuilder<C>
where
    C: Send + Sync + 'static,
{
    /// Registers an opaque-payload handler.
    pub fn register<H>(mut self, service: &str, method: &str, handler: H) -> Self
    where
        H: UnaryHandler<C> + 'static,
    {
        if service.trim().is_empty() {
            self.errors.push(RegistrationError::EmptyServiceName);
            return self;
        }
        if method.trim().is_empty() {
            self.errors.push(RegistrationError::EmptyMethodName {
                service: service.to_string(),
            });
            return self;
        }
        let methods = self.services.entry(service.to_string()).or_default();
        if methods.contains_key(method) {
            self.errors.push(RegistrationError::DuplicateHandler {
                service: service.to_string(),
                method: method.to_string(),
            });
            return self;
        }
        methods.insert(method.to_string(), Arc::new(handler));
        self
    }

    /// Registers a handler with typed request and response payloads.
    pub fn unary<Req, Resp, F, Fut>(self, service: &str, method: &str, handler: F) -> Self
    where
        F: Fn(Arc<C>, Req) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Resp, HandlerError>> + Send + 'static,
        Req: DeserializeOwned + Send + 'static,
        Resp: Serialize + Send + 'static,
    {
        let typed = TypedUnaryHandler {
            rpc_name: format!("{service}.{method}"),
            handler,
            _payload: PhantomData,
        };
        self.register(service, method, typed)
    }

    /// Freezes the table. The first registration error wins.
    pub fn build(self) -> Result<ServiceHandlers<C>, RegistrationError> {
        if let Some(error) = self.errors.into_iter().next() {
            return Err(error);
        }
        Ok(ServiceHandlers {
            services: self.services,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde::{Deserialize, Serialize};
    use serde_json::{json, Value};

    use super::ServiceHandlers;
    use crate::{HandlerError, RegistrationError, RpcError};

    #[derive(Debug, Deserialize)]
    struct EchoRequest {
        text: String,
    }

    #[derive(Debug, Serialize)]
    struct EchoResponse {
        echoed: String,
        calls: u32,
    }

    struct Counter {
        calls: u32,
    }

    fn echo_table() -> ServiceHandlers<Counter> {
        ServiceHandlers::builder()
            .unary(
                "EchoService",
                "echo",
                |context: Arc<Counter>, request: EchoRequest| async move {
                    Ok::<_, HandlerError>(EchoResponse {
                        echoed: request.text,
                        calls: context.calls,
                    })
                },
            )
            .register(
                "EchoService",
                "raw",
                |_context: Arc<Counter>, message: Value| async move {
                    Ok::<_, HandlerError>(message)
                },
            )
            .build()
            .expect("valid table")
    }

    #[tokio::test]
    async fn functional_typed_handler_decodes_request_and_encodes_response() {
        let table = echo_table();
        let handler = table.resolve("EchoService", "echo").expect("resolve");
        let response = handler
            .handle(Arc::new(Counter { calls: 3 }), json!({"text": "hi"}))
            .await
            .expect("handler succeeds");
        assert_eq!(response, json!({"echoed": "hi", "calls": 3}));
    }

    #[tokio::test]
    async fn regression_typed_handler_rejects_undecodable_payload() {
        let table = echo_table();
        let handler = table.resolve("EchoService", "echo").expect("resolve");
        let error = handler
            .handle(Arc::new(Counter { calls: 0 }), json!({"wrong": 1}))
            .await
            .expect_err("decode should fail");
        assert!(
            error.message().starts_with("invalid request payload for EchoService.echo"),
            "message: {}",
            error.message()
        );
    }

    #[test]
    fn unit_resolve_uses_exact_names_only() {
        let table = echo_table();
        assert_eq!(table.len(), 2);
        assert!(table.contains("EchoService", "raw"));
        assert!(matches!(
            table.resolve("echoservice", "echo"),
            Err(RpcError::ServiceNotFound { .. })
        ));
        assert!(matches!(
            table.resolve("EchoService", "ech"),
            Err(RpcError::MethodNotFound { .. })
        ));
        assert_eq!(table.methods("EchoService"), vec!["echo", "raw"]);
        assert_eq!(table.services().collect::<Vec<_>>(), vec!["EchoService"]);
        assert!(table.methods("Missing").is_empty());
    }

    #[test]
    fn regression_builder_rejects_duplicates_and_blank_names() {
        let noop =
            |_context: Arc<Counter>, message: Value| async move { Ok::<_, HandlerError>(message) };
        let duplicate = ServiceHandlers::<Counter>::builder()
            .register("S", "m", noop)
            .register("S", "m", noop)
            .build();
        assert_eq!(
            duplicate.err(),
            Some(RegistrationError::DuplicateHandler {
                service: "S".to_string(),
                method: "m".to_string(),
            })
        );

        let blank = ServiceHandlers::<Counter>::builder()
            .register(" ", "m", noop)
            .build();
        assert_eq!(blank.err(), Some(RegistrationError::EmptyServiceName));
    }
}
