//! Endpoint paths, relative to the API base URL

/// Exchange username/password for a token pair
pub const LOGIN: &str = "auth/login/";
/// Create an account
pub const REGISTER: &str = "auth/register/";
/// Exchange a refresh token for a new access token
pub const TOKEN_REFRESH: &str = "auth/token/refresh/";

/// Pending verification snapshot
pub const REVIEW_PENDING: &str = "review/pending/";
/// Anomaly snapshot
pub const REVIEW_ANOMALIES: &str = "review/anomalies/";
/// Approve one pending item
pub const REVIEW_APPROVE: &str = "review/approve/";
/// Reject one pending item
pub const REVIEW_REJECT: &str = "review/reject/";
/// Approve many pending items
pub const REVIEW_BATCH_APPROVE: &str = "review/batch-approve/";

/// Profile completeness for the signed-in user
pub const PROFILE_STATUS: &str = "user/profile-status/";
/// Update department/designation
pub const PROFILE_UPDATE: &str = "user/update-profile/";
/// Today's check-in state
pub const ATTENDANCE_TODAY: &str = "attendance/today/";
/// Attendance history, newest first
pub const ATTENDANCE_HISTORY: &str = "attendance/history/";
/// Close the open check-in
pub const ATTENDANCE_CHECKOUT: &str = "attendance/checkout/";
