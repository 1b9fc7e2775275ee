//! Centralized constants for default endpoints and UA.

/// Identifies the scraper honestly; the sources do not block it.
pub(crate) const USER_AGENT: &str = "AutoflowBot/1.0";

/// PBOC daily announcement directory (page files are appended).
pub(crate) const DEFAULT_PBC_INDEX: &str =
    "https://www.pbc.gov.cn/zhengcehuobisi/125207/125213/125440/17105/";

/// PBOC key chart page listing recent USD/CNY mid rates.
pub(crate) const DEFAULT_PBC_KEYCHART: &str =
    "https://www.pbc.gov.cn/zhengcehuobisi/125207/125213/125440/4385116/index.html";

/// CFETS per-date central parity notice (`searchDate` is appended as a query parameter).
pub(crate) const DEFAULT_CFETS_NOTICE: &str =
    "https://www.chinamoney.org.cn/chinese/ccprnoticecontent/index.html";

/// SAFE RMB central parity query endpoint.
pub(crate) const DEFAULT_SAFE_PORTAL: &str = "https://www.safe.gov.cn/AppStructured/hlw/RMBQuery.do";

/// Environment variable naming the SAFE snapshot directory.
pub(crate) const SNAPSHOT_DIR_ENV: &str = "SAFE_SNAPSHOT_DIR";
