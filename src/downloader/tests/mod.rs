use super::batch::{BatchStep, aggregate_progress};
use super::task::{TaskAddress, TaskStep};
use super::test_helpers::*;
use super::*;
use crate::error::{ErrorKind, TransferError};
use crate::transfer::TransferEvent;
use crate::types::Status;
