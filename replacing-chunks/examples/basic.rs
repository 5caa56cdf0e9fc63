// Example: a windowed array over a fake paginated backend.
use std::time::Duration;

use replacing_chunks::{
    ArrayEvent, BoxError, ChunksArray, ChunksArrayOptions, FetchReply, FetchRequest, Record,
    ReloadOptions, source_fn,
};

#[derive(Clone, Debug)]
struct Message {
    seq: u64,
    text: String,
}

impl Record for Message {
    type Index = u64;
    type Id = u64;

    fn index(&self) -> u64 {
        self.seq
    }

    fn id(&self) -> u64 {
        self.seq
    }
}

const TOTAL: i64 = 10_000;

async fn fetch_messages(request: FetchRequest<u64>) -> Result<FetchReply<Message>, BoxError> {
    tokio::time::sleep(Duration::from_millis(5)).await;
    let base = request.anchor.map_or(0, |seq| seq as i64);
    let from = (base + request.offset).clamp(0, TOTAL);
    let to = (from + request.size as i64).min(TOTAL);
    let items = (from..to)
        .map(|seq| Message {
            seq: seq as u64,
            text: format!("message #{seq}"),
        })
        .collect::<Vec<_>>();
    Ok(items.into())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let options = ChunksArrayOptions::new(50)
        .with_window(0, 20)
        .with_index_margin(5)
        .with_initial_jump_anchor(Some(5_000));
    let array: ChunksArray<Message> = ChunksArray::new(source_fn(fetch_messages), options);
    array.subscribe(|event| {
        if let ArrayEvent::HeadAboutToChange { inserted, .. } = event {
            println!("head grows by {inserted} rows");
        }
    });

    let _ = array.wait_initial_load().await;
    array.settled().await;
    println!("state={:?}", array.state());
    println!("first={:?}", array.first_item().map(|m| m.text));

    // Scroll down a page.
    let (start, end) = (array.start() + 20, array.end() + 20);
    array.set_window(start, end);
    array.settled().await;
    println!("after scroll: first={:?}", array.first_item().map(|m| m.seq));

    let reloaded = array.reload(ReloadOptions::default()).await;
    println!("reload={reloaded:?} buffer_len={}", array.buffer_len());

    array.with_view(|view| {
        for message in view.iter().take(3) {
            println!("  {}", message.text);
        }
    });
}
