mod sketch_detail;
mod sketch_list;

pub use sketch_detail::SketchDetailView;
pub use sketch_list::SketchListView;
