// Scrapeflow Infrastructure - Chrome Adapter
// Implements: BrowserLauncher, BrowserContext, BrowserPage over CDP

mod convert;
pub mod launcher;
pub mod page;

pub use launcher::{ChromeConfig, ChromeContext, ChromeLauncher};
pub use page::ChromePage;
