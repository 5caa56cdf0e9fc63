use replacing_chunks::{
    BoxError, ChunksArray, ChunksArrayOptions, FetchReply, FetchRequest, Record, source_fn,
};
use replacing_chunks_adapter::{Controller, ScrollCorrection};

#[derive(Clone, Debug)]
struct Line(u32);

impl Record for Line {
    type Index = u32;
    type Id = u32;

    fn index(&self) -> u32 {
        self.0
    }

    fn id(&self) -> u32 {
        self.0
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    // Example: open a log in the middle, then scroll up into older lines.
    //
    // The adapter flow is typically:
    // 1) report viewport size and scroll offset to the controller
    // 2) once per frame, apply `take_scroll_correction()` to the real scroll container
    // 3) render `controller.array().with_view(..)`
    let source = source_fn(|request: FetchRequest<u32>| async move {
        let base = request.anchor.map_or(0, i64::from);
        let from = (base + request.offset).clamp(0, 100_000);
        let to = (from + request.size as i64).min(100_000);
        Ok::<_, BoxError>(FetchReply::Items((from..to).map(|i| Line(i as u32)).collect()))
    });
    let options = ChunksArrayOptions::new(40)
        .with_window(0, 30)
        .with_initial_jump_anchor(Some(50_000));
    let array: ChunksArray<Line> = ChunksArray::new(source, options);

    let mut c = Controller::new(array, 16);
    c.on_viewport_size(480);
    c.array().settled().await;
    report(&c, "after jump");

    // The user drags to the very top of what is loaded.
    c.on_scroll(0);
    c.array().settled().await;
    report(&c, "after scrolling up");
}

fn report(c: &Controller<Line>, label: &str) {
    match c.take_scroll_correction() {
        Some(ScrollCorrection::Shift(px)) => println!("{label}: scroll by {px}px"),
        Some(ScrollCorrection::ResetTo(px)) => println!("{label}: scroll to {px}px"),
        None => println!("{label}: no correction"),
    }
    println!(
        "  offset={} first={:?}",
        c.scroll_offset(),
        c.array().first_item()
    );
}
