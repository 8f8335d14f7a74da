use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::api::declarations::declare_views,
        crate::api::declarations::get_declaration,
        crate::api::declarations::list_for_clipper,
        crate::api::declarations::list_for_clip,
        crate::api::withdrawals::request_withdrawal,
        crate::api::withdrawals::list_withdrawals,
        crate::api::withdrawals::wallet,
        crate::api::top_ups::create_top_up,
        crate::api::admin::approve,
        crate::api::admin::reject,
        crate::api::admin::pay,
        crate::api::admin::process_withdrawal,
        crate::api::webhooks::payment_webhook
    ),
    components(
        schemas(
            crate::models::Declaration,
            crate::models::DeclarationStatus,
            crate::models::Withdrawal,
            crate::models::WithdrawalStatus,
            crate::models::PayoutMethod,
            crate::models::Wallet,
            crate::api::declarations::DeclareViewsBody,
            crate::api::withdrawals::WithdrawalBody,
            crate::api::top_ups::TopUpBody,
            crate::api::top_ups::TopUpResponse,
            crate::api::admin::RejectBody
        )
    ),
    tags(
        (name = "declarations", description = "View declarations and earnings"),
        (name = "wallet", description = "Balance, top-ups and withdrawals"),
        (name = "admin", description = "Moderation and payouts"),
        (name = "webhooks", description = "Payment processor notifications")
    )
)]
pub struct ApiDoc;
