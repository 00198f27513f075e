//! Price queries over the cache, and the refresher that fills it.

mod refresher;
mod service;
mod view;


pub use refresher::CacheRefresher;
pub use service::{PriceService, PriceServiceTrait};
pub use view::PriceView;
