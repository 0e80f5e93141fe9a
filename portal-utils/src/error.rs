#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("{0}")]
    Tabulation(String),
    #[error("{0}")]
    Sheet(String),
    // Froms
    #[error("{0}")]
    SheetRead(#[from] calamine::XlsxError),
    #[error("{0}")]
    SheetWrite(#[from] rust_xlsxwriter::XlsxError),
}
