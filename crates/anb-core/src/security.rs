use crate::domain::UserId;

/// Access gate for operator-only operations.
///
/// An empty allow-list means open mode: everyone passes. With a non-empty
/// list, only listed ids pass and an absent identity evaluates false.
pub fn is_authorized(user_id: Option<UserId>, approved_admins: &[i64]) -> bool {
    if approved_admins.is_empty() {
        return true;
    }
    let Some(user_id) = user_id else {
        return false;
    };
    approved_admins.contains(&user_id.0)
}
