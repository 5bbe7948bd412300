//! 路由处理器
//!
//! 处理器在注册路由时以一等值捕获，分发时直接调用。

use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;

use super::request::{Request, Response};
use crate::utils::Result;

/// 路由处理器 trait
///
/// `params` 为动态路由的位置捕获组，静态路由为空。
#[async_trait]
pub trait RouteHandler: Send + Sync {
    /// 处理请求
    async fn handle(&self, request: &Request, params: &[String]) -> Result<Response>;
}

/// 共享的处理器引用
pub type SharedHandler = Arc<dyn RouteHandler>;

/// 同步闭包处理器
pub struct FnHandler<F> {
    f: F,
}

#[async_trait]
impl<F> RouteHandler for FnHandler<F>
where
    F: Fn(&Request, &[String]) -> Result<Response> + Send + Sync,
{
    async fn handle(&self, request: &Request, params: &[String]) -> Result<Response> {
        (self.f)(request, params)
    }
}

/// 把同步闭包包装成处理器
///
/// ```
/// use cms_core::router::{handler_fn, Response};
///
/// let handler = handler_fn(|_req, params| Ok(Response::text(params.join(","))));
/// ```
pub fn handler_fn<F>(f: F) -> SharedHandler
where
    F: Fn(&Request, &[String]) -> Result<Response> + Send + Sync + 'static,
{
    Arc::new(FnHandler { f })
}

/// 异步闭包处理器
///
/// 闭包接收请求与参数的拥有副本，返回 future。
pub struct AsyncFnHandler<F, Fut> {
    f: F,
    _marker: PhantomData<fn() -> Fut>,
}

#[async_trait]
impl<F, Fut> RouteHandler for AsyncFnHandler<F, Fut>
where
    F: Fn(Request, Vec<String>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Response>> + Send + 'static,
{
    async fn handle(&self, request: &Request, params: &[String]) -> Result<Response> {
        (self.f)(request.clone(), params.to_vec()).await
    }
}

/// 把异步闭包包装成处理器
pub fn async_handler_fn<F, Fut>(f: F) -> SharedHandler
where
    F: Fn(Request, Vec<String>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Response>> + Send + 'static,
{
    Arc::new(AsyncFnHandler {
        f,
        _marker: PhantomData,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::request::Method;
    use crate::utils::CmsError;

    #[tokio::test]
    async fn test_handler_fn_receives_params() {
        let handler = handler_fn(|req, params| {
            Ok(Response::text(format!("{} {}", req.path, params.join("/"))))
        });

        let request = Request::new(Method::Get, "/users/42");
        let response = handler
            .handle(&request, &["42".to_string()])
            .await
            .unwrap();
        assert_eq!(response, Response::text("/users/42 42"));
    }

    #[tokio::test]
    async fn test_async_handler_propagates_error() {
        let handler = async_handler_fn(|_req, _params| async {
            Err(CmsError::HandlerFailed("boom".to_string()))
        });

        let request = Request::get("/");
        let err = handler.handle(&request, &[]).await.unwrap_err();
        assert!(matches!(err, CmsError::HandlerFailed(_)));
    }
}
