#[actix_web::main]
async fn main() -> std::io::Result<()> {
    sitedocs_server::run().await
}
