use veilcrawl::command_argument_builder;
use veilcrawl::handlers::handle_crawl;
use veilcrawl_core::print_banner;

#[tokio::main]
async fn main() {
    let matches = command_argument_builder().get_matches();

    // Show banner unless --quiet flag is set
    if !matches.get_flag("quiet") {
        print_banner();
    }

    handle_crawl(&matches).await;
}
