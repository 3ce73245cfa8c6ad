use serde::{Deserialize, Serialize};
use std::sync::Arc;
use webi_core::prelude::*;
use webi_web::prelude::*;

// ==================== 数据模型 ====================

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Message {
    from: String,
    text: String,
}

// ==================== 会话 ====================

/// 每个请求一个，由 `X-User` 请求头打开
struct UserSession {
    user: String,
}

impl Injectable for UserSession {}

// ==================== 服务层 ====================

struct MessageBoard {
    messages: parking_lot::RwLock<Vec<Message>>,
}

impl Injectable for MessageBoard {}

impl MessageBoard {
    fn post(&self, message: Message) -> usize {
        let mut messages = self.messages.write();
        messages.push(message);
        messages.len()
    }

    fn list(&self) -> Vec<Message> {
        self.messages.read().clone()
    }
}

// ==================== 控制器 ====================

struct Hallo {
    board: Inject<MessageBoard>,
    session: Inject<UserSession>,
}

impl Injectable for Hallo {
    fn injection_points(&self) -> Vec<&dyn InjectionPoint> {
        vec![&self.board, &self.session]
    }

    fn after_inject(&self) {
        tracing::info!("Hallo controller ready");
    }
}

impl RestController for Hallo {
    fn map(mapping: &mut ControllerMapping<Self>) {
        mapping.model(
            ModelDescriptor::new("Message")
                .field(FieldDescriptor::new("from", ParamType::String).description("X-User of the sender"))
                .field(FieldDescriptor::new("text", ParamType::String).required()),
        );

        mapping
            .operation("world", |_, _| Ok("world"))
            .returns(ParamType::String);

        mapping
            .operation("greet", |_, invocation| {
                let name: String = invocation.arg("name")?;
                Ok(format!("Hallo, {}!", name))
            })
            .param(ParameterDescriptor::path("name", ParamType::String).required());

        mapping
            .operation("broadcast", |hallo, invocation| {
                let text: String = invocation.arg("text")?;
                let from = hallo
                    .session
                    .get()
                    .map(|session| session.user.clone())
                    .unwrap_or_else(|| "anonymous".to_string());
                let count = hallo.board.require()?.post(Message { from, text });
                Ok(count)
            })
            .param(ParameterDescriptor::new("text", ParamType::String).required())
            .returns(ParamType::Int);

        mapping
            .operation("messages", |hallo, _| Ok(hallo.board.require()?.list()))
            .returns(ParamType::array_of(ParamType::Object("Message")));

        mapping
            .operation("post", |hallo, invocation| {
                let message: Message = invocation.arg("message")?;
                Ok(hallo.board.require()?.post(message))
            })
            .verb(Method::POST)
            .path("messages")
            .param(ParameterDescriptor::body("message", ParamType::Object("Message")).required())
            .returns(ParamType::Int);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = Environment::with_defaults();
    LoggingConfig::from_environment(&env).init()?;

    let beans = Arc::new(BeanContext::with_mode(InjectionMode::from_environment(&env)));

    beans.add_named(
        "board",
        Arc::new(MessageBoard {
            messages: parking_lot::RwLock::new(Vec::new()),
        }),
    );

    let webi = Arc::new(Webi::new(Arc::clone(&beans)));
    webi.add_filter(
        "/rest/",
        SessionFilter::new(Arc::clone(&beans), |ctx: &WebiContext| {
            ctx.header("x-user").map(|user| UserSession {
                user: user.to_string(),
            })
        }),
    );

    let rest = webi.add_handler("/rest/", RestServiceHandler::from_environment(Arc::clone(&beans), &env));
    rest.expose(Arc::new(Hallo {
        board: Inject::new("board"),
        session: Inject::new("session"),
    }));
    rest.expose(Arc::new(WebiController::new()));

    webi.add_handler("/health", |ctx: &mut WebiContext| -> Result<(), WebError> {
        ctx.set_response_type("text/plain");
        ctx.write(b"ok");
        Ok(())
    });

    if let Err(e) = beans.inject_all() {
        tracing::warn!(error = %e, "Some beans are not fully wired yet");
    }

    println!("👋 Webi - Hallo Demo");
    println!("====================\n");
    println!("  GET    /rest/hallo/world              - 固定返回 \"world\"");
    println!("  GET    /rest/hallo/greet/{{name}}       - 路径参数");
    println!("  GET    /rest/hallo/broadcast?text=..  - 必填查询参数，X-User 头打开会话");
    println!("  GET    /rest/hallo/messages           - 已广播的消息");
    println!("  POST   /rest/hallo/messages           - JSON 请求体");
    println!("  GET    /rest/webi/service             - 服务描述");
    println!("  GET    /health                        - 健康检查\n");

    WebiServer::from_environment(webi, &env).run().await?;
    Ok(())
}
