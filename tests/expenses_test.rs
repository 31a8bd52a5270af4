mod common;

use anyhow::Result;
use common::{names, seed_shared_expenses, test_service};
use splitwise::application::{AppError, ExpenseFilter};
use splitwise::domain::{NewExpense, Split};
use uuid::Uuid;

fn nets(balances: &[splitwise::domain::Balance]) -> Vec<(&str, i64)> {
    balances
        .iter()
        .map(|b| (b.participant.as_str(), b.net))
        .collect()
}

#[tokio::test]
async fn test_shared_expenses_end_to_end() -> Result<()> {
    let (service, _temp) = test_service().await?;
    seed_shared_expenses(&service).await?;

    let balances = service.get_balances().await?;
    assert_eq!(nets(&balances), vec![("A", 4000), ("B", 1000), ("C", -5000)]);
    assert_eq!(balances.iter().map(|b| b.net).sum::<i64>(), 0);

    let a = &balances[0];
    assert_eq!(a.paid, 9000);
    assert_eq!(a.owed, 5000);

    let plan = service.settlement_plan().await?;
    assert_eq!(plan.len(), 2);
    for settlement in &plan {
        assert_eq!(settlement.from, "C");
    }
    assert_eq!(plan.iter().map(|s| s.amount).sum::<i64>(), 5000);

    let state = service.snapshot().await?;
    assert_eq!(state.version, 2);
    assert_eq!(state.expenses.len(), 2);
    assert_eq!(state.expenses[0].description, "Dinner");
    assert_eq!(state.expenses[1].description, "Taxi");

    Ok(())
}

#[tokio::test]
async fn test_following_the_plan_settles_everyone() -> Result<()> {
    let (service, _temp) = test_service().await?;
    seed_shared_expenses(&service).await?;

    for settlement in service.settlement_plan().await? {
        service
            .record_payment(settlement.from, settlement.to, settlement.amount, None)
            .await?;
    }

    let balances = service.get_balances().await?;
    assert!(balances.iter().all(|b| b.net == 0));
    assert!(service.settlement_plan().await?.is_empty());
    assert_eq!(service.snapshot().await?.version, 4);

    Ok(())
}

#[tokio::test]
async fn test_equal_split_gives_remainder_to_first_participants() -> Result<()> {
    let (service, _temp) = test_service().await?;

    let expense = service
        .add_equal_expense("Groceries", 100, "B", names(&["C", "A", "B"]))
        .await?;

    let owed: Vec<(&str, i64)> = expense
        .splits
        .iter()
        .map(|s| (s.participant.as_str(), s.owed_amount))
        .collect();
    assert_eq!(owed, vec![("C", 34), ("A", 33), ("B", 33)]);

    Ok(())
}

#[tokio::test]
async fn test_invalid_expense_is_rejected_without_touching_storage() -> Result<()> {
    let (service, _temp) = test_service().await?;

    let result = service
        .add_expense(NewExpense::exact(
            "Lunch",
            1000,
            "A",
            vec![Split::new("A", 500), Split::new("B", 400)],
        ))
        .await;
    assert!(matches!(result, Err(AppError::InvalidExpense(_))));

    let result = service
        .add_expense(NewExpense::exact("Nothing", 0, "A", vec![]))
        .await;
    assert!(matches!(result, Err(AppError::InvalidExpense(_))));

    let result = service
        .add_equal_expense("Nobody", 1000, "A", Vec::new())
        .await;
    assert!(matches!(result, Err(AppError::InvalidExpense(_))));

    assert!(!service.store().data_path().exists());
    assert_eq!(service.snapshot().await?.version, 0);

    Ok(())
}

#[tokio::test]
async fn test_payment_validation() -> Result<()> {
    let (service, _temp) = test_service().await?;

    let result = service.record_payment("A", "A", 100, None).await;
    assert!(matches!(result, Err(AppError::InvalidRequest(_))));

    let result = service.record_payment("A", "B", -5, None).await;
    assert!(matches!(result, Err(AppError::InvalidExpense(_))));

    let payment = service.record_payment("C", "A", 2500, None).await?;
    assert_eq!(payment.payer, "C");
    assert_eq!(payment.splits, vec![Split::new("A", 2500)]);
    assert_eq!(payment.description, "Payment from C to A");

    Ok(())
}

#[tokio::test]
async fn test_list_expenses_filtered() -> Result<()> {
    let (service, _temp) = test_service().await?;
    seed_shared_expenses(&service).await?;
    service
        .add_equal_expense("Coffee", 500, "A", names(&["A", "B"]))
        .await?;

    let all = service.list_expenses().await?;
    assert_eq!(all.len(), 3);

    let for_c = service
        .list_expenses_filtered(ExpenseFilter {
            participant: Some("C".to_string()),
            limit: None,
        })
        .await?;
    assert_eq!(for_c.len(), 2);

    let latest = service
        .list_expenses_filtered(ExpenseFilter {
            participant: None,
            limit: Some(1),
        })
        .await?;
    assert_eq!(latest.len(), 1);
    assert_eq!(latest[0].description, "Coffee");

    let nobody = service
        .list_expenses_filtered(ExpenseFilter {
            participant: Some("Z".to_string()),
            limit: None,
        })
        .await?;
    assert!(nobody.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_get_expense() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let expense = service
        .add_equal_expense("Tickets", 3000, "A", names(&["A", "B"]))
        .await?;

    let found = service.get_expense(expense.id).await?;
    assert_eq!(found, expense);

    let missing = Uuid::new_v4();
    let result = service.get_expense(missing).await;
    assert!(matches!(result, Err(AppError::ExpenseNotFound(id)) if id == missing));

    Ok(())
}

#[tokio::test]
async fn test_ledger_survives_reopen() -> Result<()> {
    let (service, temp) = test_service().await?;
    seed_shared_expenses(&service).await?;
    drop(service);

    let reopened =
        splitwise::application::LedgerService::open(&common::test_config(&temp)).await?;
    let state = reopened.snapshot().await?;
    assert_eq!(state.version, 2);
    assert_eq!(state.expenses.len(), 2);

    let check = reopened.check_integrity().await?;
    assert!(check.report.is_ok());
    assert_eq!(check.report.balance_total, 0);
    assert!(check.lease.is_none());

    Ok(())
}

#[tokio::test]
async fn test_amounts_past_ledger_capacity_are_rejected() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let huge = 5_000_000_000_000_000_000;

    service
        .add_expense(NewExpense::exact("Big", huge, "A", vec![Split::new("B", huge)]))
        .await?;
    let result = service
        .add_expense(NewExpense::exact("Bigger", huge, "A", vec![Split::new("B", huge)]))
        .await;
    assert!(
        matches!(result, Err(AppError::InvalidRequest(_))),
        "unexpected result: {:?}",
        result
    );

    assert_eq!(service.snapshot().await?.version, 1);
    let balances = service.get_balances().await?;
    assert_eq!(nets(&balances), vec![("A", huge), ("B", -huge)]);
    assert_eq!(service.settlement_plan().await?.len(), 1);

    Ok(())
}
