/// `GET /health`: the HTTP side is up. Device listener state is under `/stats`.
pub async fn health() -> &'static str {
    "OK"
}
