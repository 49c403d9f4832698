use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "sepaqr",
        description = "SEPA Credit Transfer (EPC) QR code service"
    ),
    paths(
        crate::api::health,
        crate::api::ready,
        crate::api::version,
        crate::api::sepa_qr,
        crate::api::sepa_qr_validate,
    ),
    components(schemas(crate::validate::Input))
)]
pub struct ApiDoc;
