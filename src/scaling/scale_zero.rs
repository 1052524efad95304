// scale_zero.rs
//
// actix-web middleware that runs `FunctionScaler` in front of the
// function invocation handler.
use super::function_scaler::FunctionScaler;
use super::service_query::valid_function_name;
use actix_web::{
    body::EitherBody,
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error, HttpResponse, ResponseError,
};
use futures_util::future::LocalBoxFuture;
use std::future::{ready, Ready};
use std::rc::Rc;
use std::sync::Arc;

const FUNCTION_PREFIX: &str = "/function/";

/// Extracts the function name from paths shaped like `/function/{name}/...`.
pub fn function_name_from_path(path: &str) -> Option<&str> {
    let rest = &path[path.find(FUNCTION_PREFIX)? + FUNCTION_PREFIX.len()..];
    let end = rest.find(['/', '?']).unwrap_or(rest.len());
    let name = &rest[..end];
    (!name.is_empty()).then_some(name)
}

/// Middleware factory. Build one per app with a shared scaler.
#[derive(Clone)]
pub struct ScaleFromZero {
    scaler: Arc<FunctionScaler>,
}

impl ScaleFromZero {
    pub fn new(scaler: Arc<FunctionScaler>) -> Self {
        Self { scaler }
    }
}

impl<S, B> Transform<S, ServiceRequest> for ScaleFromZero
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Transform = ScaleFromZeroMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(ScaleFromZeroMiddleware {
            service: Rc::new(service),
            scaler: Arc::clone(&self.scaler),
        }))
    }
}

pub struct ScaleFromZeroMiddleware<S> {
    service: Rc<S>,
    scaler: Arc<FunctionScaler>,
}

impl<S, B> Service<ServiceRequest> for ScaleFromZeroMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);
        let scaler = Arc::clone(&self.scaler);

        Box::pin(async move {
            let function_name = match function_name_from_path(req.path()) {
                Some(name) => name.to_string(),
                None => {
                    log::debug!("no function name in {}, forwarding", req.path());
                    return service.call(req).await.map(ServiceResponse::map_into_left_body);
                }
            };

            if !valid_function_name(&function_name) {
                let response = HttpResponse::BadRequest()
                    .body(format!("invalid function name {}", function_name));
                return Ok(req.into_response(response).map_into_right_body());
            }

            match scaler.scale(&function_name).await {
                Ok(result) => {
                    log::debug!(
                        "function={} outcome={:?} available={} took {:?}",
                        function_name,
                        result.outcome,
                        result.available(),
                        result.duration
                    );
                    service.call(req).await.map(ServiceResponse::map_into_left_body)
                }
                Err(err) => {
                    log::debug!(
                        "function={} rejected with {}",
                        err.function_name(),
                        err.status_code()
                    );
                    let response = err.error_response();
                    Ok(req.into_response(response).map_into_right_body())
                }
            }
        })
    }
}
