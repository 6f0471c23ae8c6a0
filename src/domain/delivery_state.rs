/// Outcome of a `DeliveryStateRepository::try_record` admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryAdmission {
    Accepted,
    CooldownActive,
    DailyCapReached,
}
